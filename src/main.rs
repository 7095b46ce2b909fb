//! Wizard Session Cache inspector
//!
//! Native entry point: reports what a storage directory holds, without ever
//! printing field values.
//!
//! Usage: `wizard-session-cache [DIR] [--clear]`

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();

    let mut dir = String::from(".wizard-session-cache");
    let mut clear = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--clear" => clear = true,
            "-h" | "--help" => {
                println!("Usage: wizard-session-cache [DIR] [--clear]");
                return;
            }
            other => dir = other.to_string(),
        }
    }

    if let Err(err) = native::run(&dir, clear) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is `web::start`, this is just to satisfy the compiler
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::rc::Rc;

    use wizard_session_cache::platform::{FileStorage, StorageError, SystemClock};
    use wizard_session_cache::{CacheConfig, CryptoVault, ProgressTracker};

    pub fn run(dir: &str, clear: bool) -> Result<(), StorageError> {
        let storage = Rc::new(FileStorage::open(dir)?);
        let clock = Rc::new(SystemClock);
        let config = CacheConfig::load(storage.as_ref());
        log::info!("Inspecting {}", storage.dir().display());

        let progress = ProgressTracker::from_config(storage.clone(), clock.clone(), &config);
        match progress.load() {
            Some(state) => {
                println!(
                    "Progress: {}% ({} of {} steps, current step {})",
                    state.percent_complete(),
                    state.completed_count(),
                    state.steps.len(),
                    state.current_step_index
                );
                for step in &state.steps {
                    let mark = if step.completed { "x" } else { " " };
                    println!("  [{mark}] {} ({})", step.name, step.id);
                }
            }
            None => println!("Progress: none"),
        }

        let prefix = format!("{}:", config.vault_key_prefix);
        let mut sessions = 0;
        for key in storage.keys()? {
            let Some(step_id) = key.strip_prefix(&prefix) else {
                continue;
            };
            sessions += 1;
            let vault = CryptoVault::for_step(storage.clone(), clock.clone(), &config, step_id);
            if vault.has_valid_record() {
                let remaining = vault.remaining().as_secs();
                println!(
                    "Session {step_id}: valid, expires in {}h {:02}m",
                    remaining / 3600,
                    (remaining % 3600) / 60
                );
            } else {
                println!("Session {step_id}: invalid (expired or corrupted)");
            }
            if clear {
                vault.clear();
            }
        }
        if sessions == 0 {
            println!("Sessions: none");
        }

        if clear {
            progress.clear();
            println!("Cleared {sessions} session(s) and progress");
        }
        Ok(())
    }
}
