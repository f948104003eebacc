use std::fmt;
use std::process::Command;

/// How the ping tool is invoked, independent of the probe target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSettings {
    pub program: String,
    /// Passed to the tool as `-W`; the tool bounds its own wait for a reply.
    pub timeout_secs: Option<u64>,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            program: "ping".to_string(),
            timeout_secs: None,
        }
    }
}

/// Program and argument vector for one single-packet, TTL-limited probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ProbeCommand {
    pub fn new(target: &str, ttl: u32, settings: &ProbeSettings) -> Self {
        let mut args = vec![
            "-c".to_string(),
            "1".to_string(),
            "-t".to_string(),
            ttl.to_string(),
        ];
        if let Some(secs) = settings.timeout_secs {
            args.push("-W".to_string());
            args.push(secs.to_string());
        }
        args.push(target.to_string());

        Self {
            program: settings.program.clone(),
            args,
        }
    }

    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).env("LC_ALL", "C");
        command
    }
}

impl fmt::Display for ProbeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Renders `ping -c 1 -t <ttl> <target>`. Integer `Display` never applies
/// locale grouping, so the TTL is always plain decimal digits.
pub fn ping_command_line(target: &str, ttl: u32) -> String {
    ProbeCommand::new(target, ttl, &ProbeSettings::default()).to_string()
}
