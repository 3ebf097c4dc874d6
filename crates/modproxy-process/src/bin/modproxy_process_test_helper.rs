//! Scriptable child process for `run_command` tests.
//!
//! Arguments are executed left to right, so `--stdout a --sleep-ms 50
//! --stderr b` writes, sleeps, then writes again.

use std::io::{self, Write};
use std::process::{self, Command};
use std::str::FromStr;
use std::time::Duration;

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("modproxy_process_test_helper: {message}");
    process::exit(101);
}

fn value<T: FromStr>(args: &mut impl Iterator<Item = String>, flag: &str) -> T {
    let Some(raw) = args.next() else {
        fail(format!("{flag} needs a value"));
    };
    raw.parse()
        .unwrap_or_else(|_| fail(format!("{flag}: cannot parse `{raw}`")))
}

fn fill(mut out: impl Write, len: usize, byte: u8) {
    let chunk = [byte; 4096];
    let mut left = len;
    while left > 0 {
        let n = left.min(chunk.len());
        if out.write_all(&chunk[..n]).is_err() {
            return;
        }
        left -= n;
    }
    let _ = out.flush();
}

fn main() {
    let mut args = std::env::args().skip(1);
    let mut code = 0;

    while let Some(flag) = args.next() {
        match flag.as_str() {
            "--stdout" => {
                let text: String = value(&mut args, &flag);
                let _ = io::stdout().write_all(text.as_bytes());
                let _ = io::stdout().flush();
            }
            "--stderr" => {
                let text: String = value(&mut args, &flag);
                let _ = io::stderr().write_all(text.as_bytes());
            }
            "--stdout-bytes" => fill(io::stdout().lock(), value(&mut args, &flag), b'o'),
            "--stderr-bytes" => fill(io::stderr().lock(), value(&mut args, &flag), b'e'),
            "--print-env" => {
                let key: String = value(&mut args, &flag);
                let found = std::env::var(&key).unwrap_or_default();
                println!("{key}={found}");
            }
            "--sleep-ms" => {
                std::thread::sleep(Duration::from_millis(value(&mut args, &flag)));
            }
            // Leaves a grandchild holding our stdout/stderr pipes open.
            "--spawn-child-sleep-ms" => {
                let ms: u64 = value(&mut args, &flag);
                let exe = std::env::current_exe().unwrap_or_else(|err| fail(err));
                if let Err(err) = Command::new(exe)
                    .args(["--sleep-ms", &ms.to_string()])
                    .spawn()
                {
                    fail(err);
                }
            }
            "--exit-code" => code = value(&mut args, &flag),
            other => fail(format!("unknown flag `{other}`")),
        }
    }

    process::exit(code);
}
