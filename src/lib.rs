pub mod config;
pub mod error;
pub mod events;
pub mod natural;
pub mod playback;
pub mod scan;
pub mod stats;
pub mod tree;
pub mod processing {
    pub mod layout;
}
pub mod tasks {
    pub mod loader;
    pub mod session;
    pub mod ticker;
}

pub use error::Error;
