//! Per-task log builder
//!
//! Every task produces one message. Quiet mode keeps it to a single line:
//! `header : elapsed 1.234s, OK`. Verbose mode adds everything the task
//! recorded between a separator and the final line.

use colored::Colorize;
use std::fmt::Write;
use std::time::Instant;

pub struct LogBuilder {
    buf: String,
    /// Lines shown in every mode, ahead of the log itself
    reported: String,
    header: String,
    verbose: bool,
    started: Instant,
}

impl LogBuilder {
    pub fn new(header: impl Into<String>, verbose: bool) -> Self {
        let header = header.into();
        let mut buf = String::new();
        if verbose {
            buf.push_str("\n===============================================\n");
            let _ = writeln!(buf, "{} : started", header);
        } else {
            let _ = write!(buf, "{} : ", header);
        }
        Self {
            buf,
            reported: String::new(),
            header,
            verbose,
            started: Instant::now(),
        }
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Record a line; dropped in quiet mode
    pub fn add(&mut self, line: impl AsRef<str>) {
        if self.verbose {
            let _ = writeln!(self.buf, "{}", line.as_ref());
        }
    }

    /// Record a line the user always gets to see, e.g. an allocated address
    pub fn report(&mut self, line: impl AsRef<str>) {
        let _ = writeln!(self.reported, "{}", line.as_ref());
        if self.verbose {
            let _ = writeln!(self.buf, "{}", line.as_ref());
        }
    }

    /// Finish the message with elapsed time and outcome
    pub fn complete<E: std::fmt::Display>(mut self, result: Result<(), E>) -> (String, Result<(), E>) {
        if self.verbose {
            let _ = write!(self.buf, "{} : ", self.header);
        }
        let _ = write!(
            self.buf,
            "elapsed {:.3}s, ",
            self.started.elapsed().as_secs_f64()
        );
        match &result {
            Ok(()) => {
                let _ = write!(self.buf, "{}", "OK".green());
            }
            Err(e) => {
                let _ = write!(self.buf, "{}", e.to_string().red());
            }
        }
        if self.verbose || self.reported.is_empty() {
            (self.buf, result)
        } else {
            (self.reported + &self.buf, result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_log_is_one_line() {
        colored::control::set_override(false);
        let mut lb = LogBuilder::new("create_volumes bastion/log", false);
        lb.add("volume log already there");

        let (msg, result) = lb.complete::<String>(Ok(()));

        assert!(result.is_ok());
        assert!(msg.starts_with("create_volumes bastion/log : elapsed "));
        assert!(msg.ends_with(", OK"));
        assert!(!msg.contains("already there"));
    }

    #[test]
    fn test_verbose_log_keeps_lines_and_error() {
        colored::control::set_override(false);
        let mut lb = LogBuilder::new("ping_instances cass1", true);
        lb.add("uid=1000(ubuntu)");

        let (msg, result) = lb.complete(Err("connection refused".to_string()));

        assert!(result.is_err());
        assert!(msg.contains("ping_instances cass1 : started\n"));
        assert!(msg.contains("uid=1000(ubuntu)\n"));
        assert!(msg.ends_with("connection refused"));
    }

    #[test]
    fn test_reported_lines_survive_quiet_mode() {
        colored::control::set_override(false);
        let mut lb = LogBuilder::new("create_floating_ips", false);
        lb.add("allocating bastion_ip");
        lb.report("bastion address: 203.0.113.7");

        let (msg, _) = lb.complete::<String>(Ok(()));

        assert!(msg.starts_with("bastion address: 203.0.113.7\ncreate_floating_ips : elapsed "));
        assert!(!msg.contains("allocating"));
    }
}
