//! Show command - displays the effective configuration.

use recinit::config::Config;

/// Execute the show-config command.
pub fn cmd_show_config(config: &Config) {
    config.print();
}
