use membertype_core::db::open_db_in_memory;
use membertype_core::stubs::{COMMENTS_ALIAS, STANDARD_GROUP_ALIAS};
use membertype_core::{
    CacheKey, DataTypeRef, MemberStandardProperties, MemberType, MemberTypeRepository,
    MemberTypeValidationError, PropertyGroup, PropertyTemplate, PropertyType, ReconcilePolicy,
    RepoError, RepositoryConfig, Scope, SqliteMemberTypeRepository, StandardPropertyCatalog,
    ValueStorage,
};
use rusqlite::Connection;
use std::collections::HashSet;
use uuid::Uuid;

const CUSTOM_GROUPS: usize = 2;
const CUSTOM_PROPERTIES: usize = 3;

fn catalog_len() -> usize {
    MemberStandardProperties.templates().len()
}

fn text_property(alias: &str) -> PropertyType {
    PropertyType::new(
        alias,
        alias,
        DataTypeRef::new("Umbraco.TextBox", ValueStorage::Nvarchar),
    )
}

fn build_member_type(alias: &str) -> MemberType {
    let mut member_type = MemberType::new(alias, alias);
    member_type.add_property_group(PropertyGroup::new("details", "Details"));
    member_type.add_property_group(PropertyGroup::new("address", "Address"));
    member_type.add_property_type(Some("details"), text_property("firstName"));
    member_type.add_property_type(Some("details"), text_property("lastName"));
    member_type.add_property_type(Some("address"), text_property("city"));
    member_type
}

fn group_aliases(member_type: &MemberType) -> HashSet<String> {
    member_type
        .property_groups
        .iter()
        .map(|group| group.alias.clone())
        .collect()
}

fn property_aliases(member_type: &MemberType) -> HashSet<String> {
    member_type
        .property_types()
        .map(|property| property.alias.clone())
        .collect()
}

fn row_count(conn: &Connection, table: &str) -> usize {
    let count: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
            row.get(0)
        })
        .unwrap();
    count as usize
}

fn repo(conn: &Connection) -> SqliteMemberTypeRepository {
    SqliteMemberTypeRepository::try_new(conn, &RepositoryConfig::default()).unwrap()
}

fn begin(conn: &Connection) -> Scope<'_> {
    Scope::begin(conn, &RepositoryConfig::default()).unwrap()
}

fn rename_builtins(member_type: &mut MemberType) {
    for (index, template) in MemberStandardProperties.templates().iter().enumerate() {
        let property = member_type.property_type_mut(template.alias).unwrap();
        property.alias = format!("renamedBuiltin{index}");
    }
}

#[test]
fn create_adds_builtin_group_and_roundtrips_by_id_and_key() {
    let conn = open_db_in_memory().unwrap();
    let repo = repo(&conn);
    let scope = begin(&conn);

    let mut member_type = build_member_type("customer");
    repo.save(&scope, &mut member_type).unwrap();

    assert!(member_type.has_identity());
    assert_eq!(member_type.property_groups.len(), CUSTOM_GROUPS + 1);
    assert_eq!(
        member_type.property_type_count(),
        CUSTOM_PROPERTIES + catalog_len()
    );
    assert!(member_type.property_groups.iter().all(|g| g.has_identity()));
    assert!(member_type.property_types().all(|p| p.has_identity()));
    assert!(member_type.property_group(STANDARD_GROUP_ALIAS).is_some());

    let by_id = repo.get(&scope, member_type.id).unwrap().unwrap();
    let by_key = repo.get_by_key(&scope, member_type.key).unwrap().unwrap();
    for loaded in [&by_id, &by_key] {
        assert_eq!(group_aliases(loaded), group_aliases(&member_type));
        assert_eq!(property_aliases(loaded), property_aliases(&member_type));
    }
    assert_eq!(by_id, member_type);
    scope.complete().unwrap();

    let scope = begin(&conn);
    let reloaded = repo.get(&scope, member_type.id).unwrap().unwrap();
    assert_eq!(property_aliases(&reloaded), property_aliases(&member_type));
}

#[test]
fn update_does_not_restore_renamed_builtins() {
    let conn = open_db_in_memory().unwrap();
    let repo = repo(&conn);
    let scope = begin(&conn);

    let mut member_type = build_member_type("customer");
    repo.save(&scope, &mut member_type).unwrap();
    rename_builtins(&mut member_type);
    repo.save(&scope, &mut member_type).unwrap();

    assert_eq!(member_type.property_groups.len(), CUSTOM_GROUPS + 1);
    assert_eq!(
        member_type.property_type_count(),
        CUSTOM_PROPERTIES + catalog_len()
    );
    assert_eq!(row_count(scope.conn(), "property_groups"), CUSTOM_GROUPS + 1);
    assert_eq!(
        row_count(scope.conn(), "property_types"),
        CUSTOM_PROPERTIES + catalog_len()
    );
    assert!(member_type.property_type(COMMENTS_ALIAS).is_none());
}

#[test]
fn fetch_restores_renamed_builtins_and_persists_them_once() {
    let conn = open_db_in_memory().unwrap();
    let repo = repo(&conn);
    let scope = begin(&conn);

    let mut member_type = build_member_type("customer");
    repo.save(&scope, &mut member_type).unwrap();
    rename_builtins(&mut member_type);
    repo.save(&scope, &mut member_type).unwrap();
    scope.complete().unwrap();

    let expected = CUSTOM_PROPERTIES + catalog_len() * 2;

    let scope = begin(&conn);
    let fetched = repo.get(&scope, member_type.id).unwrap().unwrap();
    assert_eq!(fetched.property_type_count(), expected);
    assert!(fetched.property_types().all(|p| p.has_identity()));
    assert!(fetched.property_type(COMMENTS_ALIAS).is_some());
    assert!(fetched.property_type("renamedBuiltin0").is_some());
    assert_eq!(row_count(scope.conn(), "property_types"), expected);
    scope.complete().unwrap();

    let scope = begin(&conn);
    let again = repo.get_by_alias(&scope, "customer").unwrap().unwrap();
    assert_eq!(again.property_type_count(), expected);
    assert_eq!(row_count(scope.conn(), "property_types"), expected);
}

#[test]
fn fetch_repairs_builtin_rows_removed_from_storage() {
    let conn = open_db_in_memory().unwrap();
    let repo = repo(&conn);
    let scope = begin(&conn);

    let mut member_type = build_member_type("customer");
    repo.save(&scope, &mut member_type).unwrap();
    scope
        .conn()
        .execute(
            "DELETE FROM property_types WHERE alias = ?1;",
            [COMMENTS_ALIAS],
        )
        .unwrap();

    let fetched = repo.get(&scope, member_type.id).unwrap().unwrap();
    let restored = fetched.property_type(COMMENTS_ALIAS).unwrap();
    assert!(restored.has_identity());
    assert_eq!(
        fetched.group_of(COMMENTS_ALIAS).map(|g| g.alias.as_str()),
        Some(STANDARD_GROUP_ALIAS)
    );
    assert_eq!(
        row_count(scope.conn(), "property_types"),
        CUSTOM_PROPERTIES + catalog_len()
    );
}

#[test]
fn distinct_member_types_get_disjoint_property_ids() {
    let conn = open_db_in_memory().unwrap();
    let repo = repo(&conn);
    let scope = begin(&conn);

    let mut first = build_member_type("customer");
    let mut second = build_member_type("supplier");
    repo.save(&scope, &mut first).unwrap();
    repo.save(&scope, &mut second).unwrap();

    let first_ids: HashSet<_> = first.property_types().map(|p| p.id).collect();
    let second_ids: HashSet<_> = second.property_types().map(|p| p.id).collect();
    assert_eq!(first_ids.len(), first.property_type_count());
    assert!(first_ids.is_disjoint(&second_ids));

    let first_keys: HashSet<_> = first.property_types().map(|p| p.key).collect();
    assert!(second.property_types().all(|p| !first_keys.contains(&p.key)));
}

#[test]
fn empty_alias_is_rejected_before_any_write() {
    let conn = open_db_in_memory().unwrap();
    let repo = repo(&conn);
    let scope = begin(&conn);

    for alias in ["", "  "] {
        let mut member_type = build_member_type(alias);
        let err = repo.save(&scope, &mut member_type).unwrap_err();

        assert!(matches!(
            err,
            RepoError::Validation(MemberTypeValidationError::EmptyAlias)
        ));
        assert!(!member_type.has_identity());
        assert_eq!(member_type.property_type_count(), CUSTOM_PROPERTIES);
    }

    assert_eq!(repo.count(&scope).unwrap(), 0);
    assert_eq!(row_count(scope.conn(), "property_groups"), 0);
    assert_eq!(row_count(scope.conn(), "property_types"), 0);
}

#[test]
fn delete_is_terminal_and_idempotent() {
    let conn = open_db_in_memory().unwrap();
    let repo = repo(&conn);
    let scope = begin(&conn);

    let mut member_type = build_member_type("customer");
    repo.save(&scope, &mut member_type).unwrap();
    assert!(repo.exists(&scope, member_type.id).unwrap());
    repo.get(&scope, member_type.id).unwrap();

    repo.delete(&scope, &member_type).unwrap();

    assert!(!repo.exists(&scope, member_type.id).unwrap());
    assert!(repo.get(&scope, member_type.id).unwrap().is_none());
    assert!(repo.get_by_key(&scope, member_type.key).unwrap().is_none());
    assert!(repo.get_by_alias(&scope, "customer").unwrap().is_none());
    assert_eq!(row_count(scope.conn(), "property_groups"), 0);
    assert_eq!(row_count(scope.conn(), "property_types"), 0);

    repo.delete(&scope, &member_type).unwrap();
    repo.delete(&scope, &MemberType::new("transient", "Transient"))
        .unwrap();
}

#[test]
fn batch_fetch_returns_all_or_requested_subset() {
    let conn = open_db_in_memory().unwrap();
    let repo = repo(&conn);
    let scope = begin(&conn);

    let mut keys = Vec::new();
    let mut ids = Vec::new();
    for alias in ["customer", "supplier", "partner"] {
        let mut member_type = build_member_type(alias);
        repo.save(&scope, &mut member_type).unwrap();
        keys.push(member_type.key);
        ids.push(member_type.id);
    }

    assert_eq!(repo.get_all(&scope).unwrap().len(), 3);
    assert_eq!(repo.count(&scope).unwrap(), 3);

    let requested = [keys[2], Uuid::new_v4(), keys[0], keys[0]];
    let subset = repo.get_many(&scope, &requested).unwrap();
    let subset_keys: HashSet<_> = subset.iter().map(|m| m.key).collect();
    assert_eq!(subset.len(), 2);
    assert_eq!(subset_keys, HashSet::from([keys[0], keys[2]]));

    let by_ids = repo.get_many_by_ids(&scope, &[ids[1], 9_999]).unwrap();
    assert_eq!(by_ids.len(), 1);
    assert_eq!(by_ids[0].id, ids[1]);

    assert!(repo.get_many(&scope, &[]).unwrap().is_empty());
}

#[test]
fn member_type_without_properties_still_gains_builtins() {
    let conn = open_db_in_memory().unwrap();
    let repo = repo(&conn);
    let scope = begin(&conn);

    let mut member_type = build_member_type("customer");
    member_type.clear_property_types();
    repo.save(&scope, &mut member_type).unwrap();

    assert_eq!(member_type.property_groups.len(), CUSTOM_GROUPS + 1);
    assert_eq!(member_type.property_type_count(), catalog_len());
    let group = member_type.property_group(STANDARD_GROUP_ALIAS).unwrap();
    assert_eq!(group.property_types.len(), catalog_len());
}

#[test]
fn update_removes_dropped_groups_and_properties() {
    let conn = open_db_in_memory().unwrap();
    let repo = repo(&conn);
    let scope = begin(&conn);

    let mut member_type = build_member_type("customer");
    repo.save(&scope, &mut member_type).unwrap();
    let kept_group_id = member_type.property_group("details").unwrap().id;

    member_type.property_groups.retain(|group| group.alias != "address");
    member_type.property_group_mut("details").unwrap().name = "Personal".to_string();
    member_type.add_property_type(None, text_property("notes"));
    repo.save(&scope, &mut member_type).unwrap();

    assert_eq!(row_count(scope.conn(), "property_groups"), CUSTOM_GROUPS);
    assert_eq!(
        row_count(scope.conn(), "property_types"),
        CUSTOM_PROPERTIES + catalog_len()
    );

    let loaded = repo.get(&scope, member_type.id).unwrap().unwrap();
    let details = loaded.property_group("details").unwrap();
    assert_eq!(details.id, kept_group_id);
    assert_eq!(details.name, "Personal");
    assert!(loaded.property_type("city").is_none());
    assert!(loaded.group_of("notes").is_none());
    assert!(loaded.property_type("notes").unwrap().has_identity());
}

#[test]
fn update_of_deleted_member_type_returns_not_found() {
    let conn = open_db_in_memory().unwrap();
    let repo = repo(&conn);
    let scope = begin(&conn);

    let mut member_type = build_member_type("customer");
    repo.save(&scope, &mut member_type).unwrap();
    repo.delete(&scope, &member_type).unwrap();

    let err = repo.save(&scope, &mut member_type).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(id) if id == member_type.id));
}

#[test]
fn duplicate_alias_surfaces_storage_error_and_keeps_caller_aggregate() {
    let conn = open_db_in_memory().unwrap();
    let repo = repo(&conn);
    let scope = begin(&conn);

    let mut first = build_member_type("customer");
    repo.save(&scope, &mut first).unwrap();

    let mut second = build_member_type("CUSTOMER");
    let err = repo.save(&scope, &mut second).unwrap_err();

    assert!(matches!(err, RepoError::Db(ref db) if db.is_constraint_violation()));
    assert!(!second.has_identity());
    assert_eq!(second.property_type_count(), CUSTOM_PROPERTIES);
    assert_eq!(repo.count(&scope).unwrap(), 1);
}

#[test]
fn alias_lookup_ignores_case() {
    let conn = open_db_in_memory().unwrap();
    let repo = repo(&conn);
    let scope = begin(&conn);

    let mut member_type = build_member_type("Customer");
    repo.save(&scope, &mut member_type).unwrap();

    let loaded = repo.get_by_alias(&scope, "  cUsToMeR ").unwrap().unwrap();
    assert_eq!(loaded.id, member_type.id);
    assert!(repo.exists_by_alias(&scope, "CUSTOMER").unwrap());
    assert!(!repo.exists_by_alias(&scope, "supplier").unwrap());
    assert!(repo.get_by_alias(&scope, "").unwrap().is_none());
}

#[test]
fn scope_dropped_without_complete_rolls_back() {
    let conn = open_db_in_memory().unwrap();
    let repo = repo(&conn);

    {
        let scope = begin(&conn);
        let mut member_type = build_member_type("customer");
        repo.save(&scope, &mut member_type).unwrap();
        assert_eq!(repo.count(&scope).unwrap(), 1);
    }

    let scope = begin(&conn);
    assert_eq!(repo.count(&scope).unwrap(), 0);
    assert_eq!(row_count(scope.conn(), "property_types"), 0);
}

#[test]
fn reads_are_cached_and_writes_invalidate() {
    let conn = open_db_in_memory().unwrap();
    let repo = repo(&conn);
    let scope = begin(&conn);

    let mut member_type = build_member_type("customer");
    repo.save(&scope, &mut member_type).unwrap();

    repo.get(&scope, member_type.id).unwrap().unwrap();
    let hits_before = scope.cache().stats().hits;
    repo.get_by_key(&scope, member_type.key).unwrap().unwrap();
    repo.get_by_alias(&scope, "customer").unwrap().unwrap();
    assert_eq!(scope.cache().stats().hits, hits_before + 2);

    member_type.alias = "client".to_string();
    member_type.name = "Client".to_string();
    repo.save(&scope, &mut member_type).unwrap();

    assert!(scope.cache().get(&CacheKey::Id(member_type.id)).is_none());
    assert!(scope.cache().get(&CacheKey::alias("customer")).is_none());
    assert!(repo.get_by_alias(&scope, "customer").unwrap().is_none());
    let renamed = repo.get(&scope, member_type.id).unwrap().unwrap();
    assert_eq!(renamed.name, "Client");
}

#[test]
fn rename_under_small_cache_evicts_previous_alias() {
    let conn = open_db_in_memory().unwrap();
    let config = RepositoryConfig {
        cache_capacity: 4,
        ..RepositoryConfig::default()
    };
    let repo = SqliteMemberTypeRepository::try_new(&conn, &config).unwrap();
    let scope = Scope::begin(&conn, &config).unwrap();

    let mut customer = build_member_type("customer");
    let mut supplier = build_member_type("supplier");
    repo.save(&scope, &mut customer).unwrap();
    repo.save(&scope, &mut supplier).unwrap();
    repo.get(&scope, customer.id).unwrap().unwrap();
    repo.get(&scope, supplier.id).unwrap().unwrap();
    assert_eq!(scope.cache().stats().entries, 4);

    customer.alias = "client".to_string();
    repo.save(&scope, &mut customer).unwrap();

    assert!(repo.get_by_alias(&scope, "customer").unwrap().is_none());
    let renamed = repo.get_by_alias(&scope, "client").unwrap().unwrap();
    assert_eq!(renamed.id, customer.id);
    let other = repo.get_by_alias(&scope, "supplier").unwrap().unwrap();
    assert_eq!(other.id, supplier.id);
}

#[test]
fn aliases_differing_beyond_ascii_case_stay_distinct() {
    let conn = open_db_in_memory().unwrap();
    let repo = repo(&conn);
    let scope = begin(&conn);

    let mut lower = build_member_type("émilie");
    let mut upper = build_member_type("Émilie");
    repo.save(&scope, &mut lower).unwrap();
    repo.save(&scope, &mut upper).unwrap();
    assert_ne!(lower.id, upper.id);

    repo.get(&scope, upper.id).unwrap().unwrap();
    let by_lower = repo.get_by_alias(&scope, "émilie").unwrap().unwrap();
    assert_eq!(by_lower.id, lower.id);
    assert_eq!(by_lower.alias, "émilie");

    repo.save(&scope, &mut upper).unwrap();
    let again = repo.get_by_alias(&scope, "émilie").unwrap().unwrap();
    assert_eq!(again.id, lower.id);
    let by_upper = repo.get_by_alias(&scope, "Émilie").unwrap().unwrap();
    assert_eq!(by_upper.id, upper.id);
}

#[test]
fn items_copied_from_another_type_are_saved_as_new_items() {
    let conn = open_db_in_memory().unwrap();
    let repo = repo(&conn);
    let scope = begin(&conn);

    let mut customer = build_member_type("customer");
    repo.save(&scope, &mut customer).unwrap();
    let original = customer.property_group("address").unwrap().clone();
    let original_city = original.property_type("city").unwrap().clone();

    let mut supplier = MemberType::new("supplier", "Supplier");
    supplier.property_groups.push(original.clone());
    repo.save(&scope, &mut supplier).unwrap();

    let copied = supplier.property_group("address").unwrap();
    assert!(copied.has_identity());
    assert_ne!(copied.id, original.id);
    assert_ne!(copied.key, original.key);
    let copied_city = copied.property_type("city").unwrap();
    assert!(copied_city.has_identity());
    assert_ne!(copied_city.id, original_city.id);
    assert_ne!(copied_city.key, original_city.key);

    scope.cache().clear();
    let reloaded = repo.get(&scope, customer.id).unwrap().unwrap();
    let kept = reloaded.property_group("address").unwrap();
    assert_eq!(kept.id, original.id);
    assert_eq!(kept.property_type("city").unwrap().key, original_city.key);
    assert_eq!(
        row_count(scope.conn(), "property_types"),
        CUSTOM_PROPERTIES + 1 + catalog_len() * 2
    );
}

#[test]
fn disabled_fetch_policy_leaves_storage_untouched() {
    let conn = open_db_in_memory().unwrap();
    let config = RepositoryConfig {
        reconcile: ReconcilePolicy {
            on_fetch: false,
            ..ReconcilePolicy::default()
        },
        ..RepositoryConfig::default()
    };
    let repo = SqliteMemberTypeRepository::try_new(&conn, &config).unwrap();
    let scope = Scope::begin(&conn, &config).unwrap();

    let mut member_type = build_member_type("customer");
    repo.save(&scope, &mut member_type).unwrap();
    rename_builtins(&mut member_type);
    repo.save(&scope, &mut member_type).unwrap();

    let fetched = repo.get(&scope, member_type.id).unwrap().unwrap();
    assert_eq!(
        fetched.property_type_count(),
        CUSTOM_PROPERTIES + catalog_len()
    );
    assert!(fetched.property_type(COMMENTS_ALIAS).is_none());
}

struct SingleFieldCatalog {
    templates: Vec<PropertyTemplate>,
}

impl StandardPropertyCatalog for SingleFieldCatalog {
    fn group_alias(&self) -> &str {
        "system"
    }

    fn group_name(&self) -> &str {
        "System"
    }

    fn templates(&self) -> &[PropertyTemplate] {
        &self.templates
    }
}

#[test]
fn custom_catalog_drives_reconciliation() {
    let conn = open_db_in_memory().unwrap();
    let config = RepositoryConfig::default();
    let catalog = SingleFieldCatalog {
        templates: vec![PropertyTemplate {
            alias: "externalId",
            name: "External Id",
            data_type: DataTypeRef::new("Umbraco.Label", ValueStorage::Nvarchar),
            member_access: Default::default(),
        }],
    };
    let repo = SqliteMemberTypeRepository::with_catalog(&conn, &config, catalog).unwrap();
    let scope = Scope::begin(&conn, &config).unwrap();

    let mut member_type = build_member_type("customer");
    repo.save(&scope, &mut member_type).unwrap();

    assert_eq!(member_type.property_type_count(), CUSTOM_PROPERTIES + 1);
    assert_eq!(
        member_type.group_of("externalId").map(|g| g.alias.as_str()),
        Some("system")
    );
    assert!(member_type.property_group(STANDARD_GROUP_ALIAS).is_none());
}
