pub mod drops;
pub mod events;
pub mod settings;
