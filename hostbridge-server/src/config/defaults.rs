//! Default configuration values
//!
//! Written out by `--print-default-config` as a starting point.

/// Default configuration as TOML
pub const DEFAULT_CONFIG_TOML: &str = r##"
# hostbridge configuration

[bridge]
host = "127.0.0.1"
port = 3333
# token = "paste-a-long-random-secret-here"
long_poll_secs = 25
pull_recheck_ms = 1000
max_body_bytes = 8388608

[broker]
inactivity_timeout_secs = 60
sweep_interval_secs = 5
default_call_timeout_secs = 30
event_buffer_size = 500

[routing]
# Executors whose plugin_version contains this marker register as secondary
secondary_marker = "session"
default_kind = "primary"

[routing.tools.run_script]
kind = "primary"
description = "Run a script inside the host application"

# [routing.tools.inspect_session]
# kind = "secondary"
# timeout_secs = 120

[logging]
output = "stderr"
# filter = "info,hyper=warn"
"##;
