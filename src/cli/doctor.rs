//! Environment readiness check.

use anyhow::Result;

use crate::browser::find_chromium;
use crate::config::Config;

/// Check Chromium availability, configuration, and the output tree.
pub async fn run() -> Result<()> {
    println!("Magpie Doctor");
    println!("=============");
    println!();

    // OS and architecture
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    println!("OS:   {os}");
    println!("Arch: {arch}");
    println!();

    // Check Chromium
    let chromium_path = find_chromium();
    match &chromium_path {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!("[!!] Chromium NOT found. Install Chrome or Chromium, or set MAGPIE_CHROMIUM_PATH."),
    }

    // Check configuration
    let config = Config::load();
    let config_ok = match config.validate() {
        Ok(()) => {
            println!("[OK] Configuration complete for {}", config.site_url);
            true
        }
        Err(error) => {
            println!("[!!] Configuration incomplete: {error}");
            false
        }
    };

    // Check saved session state
    if config.auth_file.exists() {
        println!("[OK] Saved session found: {}", config.auth_file.display());
    } else {
        println!("[??] No saved session yet, the first scrape will sign in");
    }

    // Check output tree
    match std::fs::create_dir_all(config.articles_dir()) {
        Ok(()) => println!("[OK] Output tree writable: {}", config.output_dir.display()),
        Err(error) => println!("[!!] Output tree not writable: {error}"),
    }

    println!();
    let ready = chromium_path.is_some() && config_ok;
    if ready {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
        if chromium_path.is_none() {
            println!("  Install Chrome or Chromium and re-run `magpie doctor`.");
        }
        if !config_ok {
            println!("  Set MAGPIE_SITE_URL, MAGPIE_EMAIL, and MAGPIE_PASSWORD (a .env file works).");
        }
    }

    Ok(())
}
