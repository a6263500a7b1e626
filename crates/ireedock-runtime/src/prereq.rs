use std::fmt;
use std::process::Command;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: String,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn command_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn engine_answers(program: &str) -> bool {
    Command::new(program)
        .arg("info")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn install_hint(program: &str) -> &'static str {
    match program {
        "podman" => "apt install podman | dnf install podman | zypper install podman | pacman -S podman",
        _ => "https://docs.docker.com/engine/install/ or your distribution's docker package",
    }
}

/// Check that the container CLI for `program` is installed and that its
/// engine responds. The mock backend needs nothing.
pub fn check_container_prereqs(program: &str) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();
    if program == "mock" {
        return missing;
    }

    if !command_exists(program) {
        missing.push(MissingPrereq {
            name: program.to_owned(),
            purpose: "running toolchain containers",
            install_hint: install_hint(program),
        });
    } else if !engine_answers(program) {
        missing.push(MissingPrereq {
            name: format!("{program} engine"),
            purpose: "the container engine must be running and reachable by this user",
            install_hint: if program == "docker" {
                "start the daemon (systemctl start docker) and add yourself to the docker group"
            } else {
                "check `podman info` for configuration errors"
            },
        });
    }

    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nireedock compiles inside containers and needs a working container engine.");
    msg
}
