use std::path::{Path, PathBuf};

use serde_json::Value;

use tutor_core::config::{AppConfig, ProbeMethod};
use tutor_core::registry::Registry;
use tutor_mcp::probe_kind;

struct CheckResult {
    label: String,
    ok: bool,
    detail: String,
}

impl CheckResult {
    fn pass(label: &str, detail: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ok: true,
            detail: detail.into(),
        }
    }

    fn fail(label: &str, detail: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ok: false,
            detail: detail.into(),
        }
    }
}

pub fn run_doctor(config: &AppConfig) {
    let checks = vec![
        check_data_dir(config),
        check_registry_file(&config.registry_path()),
        check_server_kinds(config),
        check_agent_command(config),
    ];

    let mut ok_count = 0;
    let mut fail_count = 0;

    for check in &checks {
        let icon = if check.ok { "[OK]" } else { "[!!]" };
        println!("  {} {}: {}", icon, check.label, check.detail);
        if check.ok {
            ok_count += 1;
        } else {
            fail_count += 1;
        }
    }

    println!();
    println!("  {} passed, {} issues found", ok_count, fail_count);
}

fn check_data_dir(config: &AppConfig) -> CheckResult {
    let dir = config.data_dir();
    if let Err(e) = std::fs::create_dir_all(&dir) {
        return CheckResult::fail("Data dir", format!("{} (cannot create: {})", dir.display(), e));
    }

    let probe = dir.join(".doctor_test");
    match std::fs::write(&probe, "test") {
        Ok(()) => {
            std::fs::remove_file(&probe).ok();
            CheckResult::pass("Data dir", dir.display().to_string())
        }
        Err(e) => CheckResult::fail("Data dir", format!("{} (not writable: {})", dir.display(), e)),
    }
}

fn check_registry_file(path: &Path) -> CheckResult {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return CheckResult::pass("Registry", format!("{} (not created yet)", path.display()));
        }
        Err(e) => return CheckResult::fail("Registry", format!("{}: {}", path.display(), e)),
    };

    match serde_json::from_str::<Value>(&text) {
        Ok(value) if value.get("servers").map_or(true, Value::is_object) => {
            let count = value
                .get("servers")
                .and_then(Value::as_object)
                .map_or(0, |s| s.len());
            CheckResult::pass("Registry", format!("{} ({} servers)", path.display(), count))
        }
        Ok(_) => CheckResult::fail(
            "Registry",
            format!("{}: `servers` is not an object, it will load as empty", path.display()),
        ),
        Err(e) => CheckResult::fail(
            "Registry",
            format!("{}: corrupt ({}), it will load as empty", path.display(), e),
        ),
    }
}

fn check_server_kinds(config: &AppConfig) -> CheckResult {
    let registry = Registry::open(config.registry_path());
    let servers = registry.enabled_for_invocation();
    if servers.is_empty() {
        return CheckResult::pass("MCP servers", "none enabled");
    }

    let invalid: Vec<String> = servers
        .iter()
        .filter(|(_, config)| {
            config
                .as_object()
                .map_or(true, |c| probe_kind(c).is_none())
        })
        .map(|(name, _)| name.clone())
        .collect();

    if invalid.is_empty() {
        CheckResult::pass("MCP servers", format!("{} enabled, all valid", servers.len()))
    } else {
        CheckResult::fail(
            "MCP servers",
            format!("unsupported type for: {}", invalid.join(", ")),
        )
    }
}

fn check_agent_command(config: &AppConfig) -> CheckResult {
    let command = &config.agent.command;
    let needed = config.probe.method == ProbeMethod::Agent;
    match find_on_path(command) {
        Some(path) => CheckResult::pass("Agent", path.display().to_string()),
        None if needed => CheckResult::fail(
            "Agent",
            format!("`{}` not found on PATH (chat and connection tests need it)", command),
        ),
        None => CheckResult::fail("Agent", format!("`{}` not found on PATH (chat needs it)", command)),
    }
}

fn find_on_path(command: &str) -> Option<PathBuf> {
    let candidate = Path::new(command);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(command))
        .find(|path| path.is_file())
}
