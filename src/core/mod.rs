// Core modules implementing the greeting buffer, sessions, hosts, and error modeling.
pub mod device;
pub mod error;
pub mod greeting;
pub mod host;
pub mod transfer;
