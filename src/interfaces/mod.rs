pub mod messaging;
pub mod providers;
pub mod scheduler;
