pub mod server;

use crate::config::IdentityConfig;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        config: IdentityConfig,
    },
}
