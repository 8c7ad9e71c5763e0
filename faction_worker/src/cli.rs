use std::{env, env::VarError};

/// There's no real CLI for the worker. Any argument prints the help and the current configuration.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // API keys live in the database, never in the environment, but be explicit anyway
    const DISPLAY_ENVS: [&str; 22] = [
        "RUST_LOG",
        "FP_DATABASE_URL",
        "FP_DB_MAX_CONNECTIONS",
        "FP_API_BASE_URL",
        "FP_API_CONNECT_TIMEOUT",
        "FP_API_READ_TIMEOUT",
        "FP_API_MAX_ATTEMPTS",
        "FP_API_BASE_DELAY_MS",
        "FP_API_RATE_LIMIT_DELAY_MS",
        "FP_BREAKER_THRESHOLD",
        "FP_BREAKER_COOLDOWN",
        "FP_NEWS_PAGE_SIZE",
        "FP_NEWS_MAX_PAGES",
        "FP_LOOKBACK",
        "FP_CLAIM_TTL",
        "FP_MAX_CLAIM_RESETS",
        "FP_FACTION_DELAY_MS",
        "FP_VERIFIED_BY",
        "FP_RUN_INTERVAL",
        "FP_RUN_ONCE",
        "FP_NOTIFY_WEBHOOK_URL",
        "FP_NOTIFY_TIMEOUT",
    ];

    println!("Current environment values:");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
