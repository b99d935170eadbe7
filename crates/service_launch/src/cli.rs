//! Command-line interface for service_launch

use argh::FromArgs;

/// Launch and supervise local web services defined in a service file
#[derive(FromArgs, Debug)]
pub struct LaunchArgs {
    /// path to the service file (default: services.yaml)
    #[argh(positional, default = "String::from(\"services.yaml\")")]
    pub service_file: String,

    /// launch only these services (comma-separated; default: all)
    #[argh(option, short = 's', from_str_fn(parse_services))]
    pub services: Option<Vec<String>>,

    /// validate the service file and exit
    #[argh(switch)]
    pub validate: bool,

    /// do not open ready services in the browser
    #[argh(switch)]
    pub no_open: bool,

    /// log level (error, warn, info, debug, trace)
    #[argh(option, short = 'l', default = "String::from(\"info\")")]
    pub log_level: String,
}

/// Parse comma-separated service list
fn parse_services(s: &str) -> Result<Vec<String>, String> {
    Ok(s.split(',').map(|v| v.trim().to_string()).collect())
}

impl LaunchArgs {
    /// Explicitly selected service ids, or None for all
    pub fn selected(&self) -> Option<&[String]> {
        self.services.as_deref()
    }
}
