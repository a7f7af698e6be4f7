//! Database initialization, migrations and the board configuration table

pub mod boards;
pub mod init;
pub mod migrations;

pub use boards::*;
pub use init::*;
pub use migrations::*;
