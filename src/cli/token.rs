//! `fitquota token`: mint a user JWT for local testing.

use anyhow::{bail, Result};

use fitquota::api::auth::generate_jwt;
use fitquota::config::Config;
use fitquota::quota::validate_external_id;

pub(crate) fn cmd_token(config: &Config, external_id: &str, ttl: u64) -> Result<()> {
    let token = mint(config, external_id, ttl)?;
    println!("{token}");
    Ok(())
}

fn mint(config: &Config, external_id: &str, ttl: u64) -> Result<String> {
    if config.auth.jwt_secret.trim().is_empty() {
        bail!("auth.jwt_secret is not set (set FITQUOTA_JWT_SECRET)");
    }
    validate_external_id(external_id)?;
    Ok(generate_jwt(external_id, &config.auth.jwt_secret, ttl)?)
}
