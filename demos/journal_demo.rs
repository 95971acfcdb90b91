//! Minimal example: encrypting journal entries per user.
//!
//! Run with: `ENCRYPTION_KEY=dev-secret cargo run --example journal_demo`
//! Set `RUST_LOG=fieldvault=debug` to see legacy and fallback decisions.
//!
//! Demonstrates:
//! - resolving the principal for a request
//! - encrypting the sensitive fields of a record before "storage"
//! - reading it back as the owner, as another user, and as legacy plaintext

use fieldvault::{record, FieldCipher, PrincipalResolver, RecordKind, RequestContext, VaultConfig};
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 1. Setup
    let config = VaultConfig::from_env()?;
    let cipher = FieldCipher::new(&config);
    let resolver = PrincipalResolver::from_config(&config);
    let fields = RecordKind::Journal.sensitive_fields();

    // 2. Resolve who is asking
    let alice = resolver.resolve(&RequestContext {
        session_user_id: Some("alice".into()),
        ..Default::default()
    });
    let stranger = resolver.resolve(&RequestContext {
        forwarded_for: Some("203.0.113.7".into()),
        ..Default::default()
    });
    println!("principals: {alice} / {stranger}");

    // 3. Alice writes an entry
    let entry = json!({
        "id": "j-1",
        "date": "2026-10-19",
        "title": "Monday",
        "content": "Finally finished the migration.",
        "mood": "relieved",
    });
    let stored = record::encrypt_fields(&cipher, &entry, fields, alice.as_str())?;
    println!("stored:   {}", serde_json::to_string_pretty(&stored)?);

    // 4. Alice reads it back
    let mine = record::decrypt_fields(&cipher, &stored, fields, alice.as_str())?;
    println!("alice:    {mine}");

    // 5. Someone else gets placeholders, not plaintext
    let theirs = record::decrypt_fields(&cipher, &stored, fields, stranger.as_str())?;
    println!("stranger: {theirs}");

    // 6. Entries written before encryption still read fine
    let legacy = json!({"id": "j-0", "title": "Old entry", "content": "plain text", "mood": null});
    let old = record::decrypt_fields(&cipher, &legacy, fields, alice.as_str())?;
    println!("legacy:   {old}");

    Ok(())
}
