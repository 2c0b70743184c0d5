//! API key setup for backend endpoints.

use std::error::Error;
use std::io::{self, BufRead, IsTerminal, Write};

use crate::cli::BackendOverrides;
use crate::core::config::Config;
use crate::core::keyring::{account_for_endpoint, CredentialStore};

fn target_endpoint(
    endpoint: Option<String>,
    overrides: &BackendOverrides,
) -> Result<String, Box<dyn Error>> {
    match endpoint.or_else(|| overrides.endpoint.clone()) {
        Some(endpoint) => Ok(endpoint),
        None => {
            let config = Config::load()?;
            Ok(overrides.apply(config.backend_config()).endpoint)
        }
    }
}

fn read_key(input: &mut impl BufRead) -> Result<String, Box<dyn Error>> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    let key = line.trim();
    if key.is_empty() {
        return Err("No API key entered".into());
    }
    Ok(key.to_string())
}

/// Reads a key from stdin (one line) and stores it for the endpoint.
pub fn store_api_key(
    endpoint: Option<String>,
    overrides: &BackendOverrides,
) -> Result<(), Box<dyn Error>> {
    let endpoint = target_endpoint(endpoint, overrides)?;
    let account = account_for_endpoint(&endpoint);

    let stdin = io::stdin();
    if stdin.is_terminal() {
        println!("🔐 API key for {account}");
        print!("Enter your API key: ");
        io::stdout().flush()?;
    }
    let key = read_key(&mut stdin.lock())?;

    CredentialStore::new().store_key(&endpoint, &key)?;
    println!("✅ Stored API key for {account}");
    Ok(())
}

pub fn remove_api_key(
    endpoint: Option<String>,
    overrides: &BackendOverrides,
) -> Result<(), Box<dyn Error>> {
    let endpoint = target_endpoint(endpoint, overrides)?;
    let account = account_for_endpoint(&endpoint);

    if CredentialStore::new().remove_key(&endpoint)? {
        println!("✅ Removed API key for {account}");
    } else {
        println!("No API key stored for {account}");
    }
    Ok(())
}
