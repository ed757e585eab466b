//! `sdst keygen|import|list|alias|delete|validate|export` — key management.

use std::path::Path;

use chrono::SecondsFormat;
use sdst_signing::container;

use crate::store::Store;
use crate::store::write_output;

pub fn keygen(store: &mut Store, algorithm: &str, alias: Option<&str>, entropy: Option<&str>) -> anyhow::Result<()> {
    let key = store.engine.generate_key(&mut store.db, algorithm, alias, entropy.map(str::as_bytes))?;
    store.save()?;

    println!("✓ Generated {} key pair", key.algorithm);
    println!("  Alias:  {}", key.alias);
    println!("  Key id: {}", key.key_id);
    println!();
    print!("{}", key.public_key);
    Ok(())
}

/// Import a PEM file. Private keys are imported as pairs, anything else as
/// a public key.
pub fn import(store: &mut Store, file: &Path, alias: Option<&str>, overwrite: bool) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)?;
    let key = if text.contains("PRIVATE KEY-----") {
        store.engine.import_private_key(&mut store.db, &text, alias, None, overwrite)?
    } else {
        store.engine.import_public_key(&mut store.db, &text, alias, None, overwrite)?
    };
    store.save()?;

    let kind = if key.is_key_pair() { "key pair" } else { "public key" };
    println!("✓ Imported {} {kind}", key.algorithm);
    println!("  Alias:  {}", key.alias);
    println!("  Key id: {}", key.key_id);
    Ok(())
}

pub fn list(store: &Store, json: bool) -> anyhow::Result<()> {
    if json {
        let keys: Vec<_> = store
            .db
            .keys()
            .map(|k| {
                serde_json::json!({
                    "alias": k.alias,
                    "keyId": k.key_id,
                    "algorithm": k.algorithm,
                    "keyPair": k.is_key_pair(),
                    "addedOn": k.added_on,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&keys)?);
        return Ok(());
    }

    if store.db.is_empty() {
        println!("No keys in {}", store.path().display());
        return Ok(());
    }
    println!("{} ({} keys)\n", store.db.db_name(), store.db.len());
    for key in store.db.keys() {
        let kind = if key.is_key_pair() { "pair" } else { "public" };
        let added = key.added_on.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)).unwrap_or_default();
        println!("  {:<20} {:<12} {:<6} {}  {added}", key.alias, key.algorithm.to_string(), kind, key.key_id);
    }
    Ok(())
}

pub fn alias(store: &mut Store, reference: &str, alias: &str) -> anyhow::Result<()> {
    let key_id = store.find_key(reference)?.key_id.clone();
    store.db.set_alias(key_id.as_str(), alias)?;
    store.save()?;
    println!("✓ {key_id} is now '{alias}'");
    Ok(())
}

pub fn delete(store: &mut Store, reference: &str) -> anyhow::Result<()> {
    let key = store.find_key(reference)?.clone();
    store.db.delete_key(key.key_id.as_str());
    store.save()?;
    println!("✓ Deleted '{}' ({})", key.alias, key.key_id);
    Ok(())
}

/// Self-test a key pair.
pub fn validate(store: &Store, reference: &str) -> anyhow::Result<()> {
    let key = store.find_key(reference)?;
    if !store.engine.validate_key_pair(key)? {
        anyhow::bail!("key pair '{}' failed the self-test: public and private key do not match", key.alias);
    }
    println!("✓ Key pair '{}' is valid", key.alias);
    Ok(())
}

/// Write the database, or one key's public PEM.
pub fn export(store: &Store, key: Option<&str>, output: Option<&Path>, plain: bool) -> anyhow::Result<()> {
    if let Some(reference) = key {
        let key = store.find_key(reference)?;
        return write_output(output, key.public_key.trim_end());
    }

    let password = if plain { None } else { store.password() };
    let text = container::export_database(store.engine.provider(), &store.db, password)?;
    write_output(output, &text)?;
    if let Some(path) = output {
        let state = if password.is_some() { "encrypted" } else { "unencrypted" };
        println!("✓ Exported {} keys ({state}) to {}", store.db.len(), path.display());
    }
    Ok(())
}
