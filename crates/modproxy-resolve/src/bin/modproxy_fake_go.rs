//! Stand-in for the `go` command in tests.
//!
//! Behaviour is driven by environment variables so the resolver under test
//! can configure it through `toolchain.env`:
//!
//! - `FAKE_GO_RECORD`: file that receives `{"args": [...], "gosumdb": ...}`
//! - `FAKE_GO_SLEEP_MS`: sleep before printing anything
//! - `FAKE_GO_STDOUT` / `FAKE_GO_STDERR`: text written to each stream
//! - `FAKE_GO_EXIT`: exit code (default 0)

use std::io::Write;
use std::time::Duration;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if let Some(path) = std::env::var_os("FAKE_GO_RECORD") {
        let record = serde_json::json!({
            "args": args,
            "gosumdb": std::env::var("GOSUMDB").ok(),
            "cwd": std::env::current_dir().ok(),
        });
        std::fs::write(path, record.to_string()).expect("write record");
    }

    if let Some(ms) = std::env::var("FAKE_GO_SLEEP_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
    {
        std::thread::sleep(Duration::from_millis(ms));
    }

    if let Ok(text) = std::env::var("FAKE_GO_STDOUT") {
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }
    if let Ok(text) = std::env::var("FAKE_GO_STDERR") {
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(text.as_bytes());
        let _ = stderr.flush();
    }

    let code = std::env::var("FAKE_GO_EXIT")
        .ok()
        .and_then(|value| value.parse::<i32>().ok())
        .unwrap_or(0);
    std::process::exit(code);
}
