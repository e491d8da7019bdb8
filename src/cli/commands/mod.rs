mod check_config;
mod classify;
mod init;

pub use check_config::cmd_check_config;
pub use classify::cmd_classify;
pub use init::cmd_init;
