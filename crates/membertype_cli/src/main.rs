//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `membertype_core` linkage end to end: open, save, fetch, report.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `membertype_cli [DB_PATH]` (in-memory when omitted).

use membertype_core::db::{open_db, open_db_in_memory};
use membertype_core::{
    core_version, DataTypeRef, MemberType, MemberTypeRepository, PropertyGroup, PropertyType,
    RepositoryConfig, Scope, SqliteMemberTypeRepository, ValueStorage,
};
use std::error::Error;
use std::process::ExitCode;

const DEMO_ALIAS: &str = "smokeMember";

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("membertype_cli error={err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    println!("membertype_core version={}", core_version());

    let conn = match std::env::args().nth(1) {
        Some(path) => open_db(path)?,
        None => open_db_in_memory()?,
    };
    let config = RepositoryConfig::default();
    let repo = SqliteMemberTypeRepository::try_new(&conn, &config)?;

    let scope = Scope::begin(&conn, &config)?;
    let mut member_type = match repo.get_by_alias(&scope, DEMO_ALIAS)? {
        Some(existing) => existing,
        None => {
            let mut created = MemberType::new(DEMO_ALIAS, "Smoke Member");
            created.add_property_group(PropertyGroup::new("profile", "Profile"));
            created.add_property_type(
                Some("profile"),
                PropertyType::new(
                    "nickname",
                    "Nickname",
                    DataTypeRef::new("Umbraco.TextBox", ValueStorage::Nvarchar),
                ),
            );
            repo.save(&scope, &mut created)?;
            created
        }
    };
    member_type.name = "Smoke Member".to_string();
    repo.save(&scope, &mut member_type)?;

    println!(
        "member_type id={} groups={} properties={} total_types={}",
        member_type.id,
        member_type.property_groups.len(),
        member_type.property_type_count(),
        repo.count(&scope)?
    );
    scope.complete()?;
    Ok(())
}
