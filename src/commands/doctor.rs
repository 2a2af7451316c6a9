use clap::ArgMatches;
use sentinel_runtime::models::resources;

pub async fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let config = super::load_config(matches)?;
    println!("🔍 Checking SSN Sentinel setup...\n");

    let mut all_ok = true;

    // Check model file and memory
    print!("• Checking model file... ");
    match resources::model_file_size(&config.model.path) {
        Ok(size) => {
            println!("✓ {} ({})", config.model.path.display(), format_bytes(size));

            print!("• Checking memory... ");
            let available = resources::available_memory_bytes();
            if size <= available {
                println!("✓ {} available", format_bytes(available));
            } else if config.model.skip_memory_check {
                println!(
                    "○ Only {} available, check skipped by configuration",
                    format_bytes(available)
                );
            } else {
                println!(
                    "✗ Model needs {} but only {} is available",
                    format_bytes(size),
                    format_bytes(available)
                );
                all_ok = false;
            }
        }
        Err(e) => {
            println!("✗ {}", e);
            println!("  Set MODEL_PATH or pass --model-path");
            all_ok = false;
        }
    }

    // Check tokenizer
    print!("• Checking tokenizer... ");
    let tokenizer = config.model.resolved_tokenizer_path();
    if tokenizer.is_file() {
        println!("✓ {}", tokenizer.display());
    } else {
        println!("✗ {} not found", tokenizer.display());
        println!("  Place tokenizer.json beside the model or pass --tokenizer-path");
        all_ok = false;
    }

    // Check port
    print!("• Checking port... ");
    if is_port_in_use(&config.api.host, config.api.port) {
        println!("✗ Port {} is in use", config.api.port);
        all_ok = false;
    } else {
        println!("✓ Port {} available", config.api.port);
    }

    print!("• Checking inference backend... ");
    if cfg!(feature = "gguf") {
        println!("✓ GGUF backend compiled in");
    } else {
        println!("✗ Built without the `gguf` feature");
        all_ok = false;
    }

    println!();
    if all_ok {
        println!("✅ All checks passed! You're ready to run: ssn-sentinel serve");
        Ok(())
    } else {
        anyhow::bail!("some checks failed, fix the issues above before running ssn-sentinel serve")
    }
}

fn is_port_in_use(host: &str, port: u16) -> bool {
    std::net::TcpListener::bind((host, port)).is_err()
}

fn format_bytes(bytes: u64) -> String {
    const GIB: f64 = (1u64 << 30) as f64;
    const MIB: f64 = (1u64 << 20) as f64;
    let bytes = bytes as f64;
    if bytes >= GIB {
        format!("{:.1} GiB", bytes / GIB)
    } else {
        format!("{:.1} MiB", bytes / MIB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(8 * (1 << 30)), "8.0 GiB");
        assert_eq!(format_bytes(512 * (1 << 20)), "512.0 MiB");
    }

    #[test]
    fn test_port_in_use_detected() {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(is_port_in_use("127.0.0.1", port));
    }
}
