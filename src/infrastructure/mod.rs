pub mod clock;
pub mod in_memory;
pub mod media;
pub mod notifier;
pub mod sandbox;
