//! Check command implementation.
//!
//! Validates system requirements and configuration.

use crate::config::{validate_effective_config, Config};
use crate::startup_checks::{check_descriptor_listing, check_net_tables, check_process_list};

/// Validates system requirements and configuration.
pub fn command_check(
    proc: bool,
    tools: bool,
    all: bool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Herakles Sockstat Exporter - System Check");
    println!("============================================");

    let mut all_ok = true;
    let proc_root = config.proc_root();

    if proc || all {
        println!("\n📁 Checking {} tables...", proc_root.display());
        match check_net_tables(&proc_root) {
            Ok(()) => println!("   ✅ unix, tcp and tcp6 tables readable"),
            Err(e) => {
                println!("   ❌ {}", e);
                all_ok = false;
            }
        }
    }

    if tools || all {
        println!("\n🛠️  Checking external tools...");
        match check_process_list(&proc_root) {
            Ok(()) => println!("   ✅ ps -eo uid,user:30,pid works"),
            Err(e) => {
                println!("   ❌ {}", e);
                all_ok = false;
            }
        }
        match check_descriptor_listing(&proc_root) {
            Ok(()) => println!("   ✅ ls -fl descriptor listing format recognised"),
            Err(e) => {
                println!("   ❌ {}", e);
                all_ok = false;
            }
        }
    }

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => {
            let options = config.collector_options();
            println!("   ✅ Configuration is valid");
            println!(
                "   ℹ️  Tracking uids {} < uid < {} plus {:?} ({:?} crediting)",
                options.tracked.min_uid,
                options.tracked.max_uid,
                options.tracked.extra_uids,
                options.known_socket_mode
            );
        }
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - system is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review warnings");
        std::process::exit(1);
    }
}
