// Public library interface for goos-installer
//
// The provisioning pipeline lives in the library so that the installer binary,
// the companion config reader and the integration tests share one implementation.

pub mod context;
pub mod detached;
pub mod disk;
pub mod error;
pub mod inspect;
pub mod medium;
pub mod models;
pub mod pipeline;
pub mod settings;
pub mod stage;
pub mod utils;
pub mod verify;
pub mod wizard;
