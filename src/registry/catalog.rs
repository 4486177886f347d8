//! The workflow system's entities and their relationships.

use std::collections::HashMap;

use super::{
    Cardinality, EntityId, FieldSpec, FieldType, OnDelete, RelationOptions, SchemaError,
    SchemaRegistry,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Account,
    RefreshToken,
    Department,
    Employee,
    Request,
    RequestItem,
    Workflow,
}

impl Entity {
    pub const ALL: [Entity; 7] = [
        Entity::Account,
        Entity::RefreshToken,
        Entity::Department,
        Entity::Employee,
        Entity::Request,
        Entity::RequestItem,
        Entity::Workflow,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Entity::Account => "Account",
            Entity::RefreshToken => "RefreshToken",
            Entity::Department => "Department",
            Entity::Employee => "Employee",
            Entity::Request => "Request",
            Entity::RequestItem => "RequestItem",
            Entity::Workflow => "Workflow",
        }
    }

    fn fields(&self) -> Vec<FieldSpec> {
        use FieldType::*;

        match self {
            Entity::Account => vec![
                FieldSpec::required("email", Text).unique(),
                FieldSpec::required("password_hash", Text),
                FieldSpec::optional("title", Text),
                FieldSpec::required("first_name", Text),
                FieldSpec::required("last_name", Text),
                FieldSpec::required("role", Text).default_sql("'User'"),
                FieldSpec::required("status", Text).default_sql("'Active'"),
                FieldSpec::required("created_at", Timestamp).default_sql("now()"),
                FieldSpec::required("updated_at", Timestamp).default_sql("now()"),
            ],
            Entity::RefreshToken => vec![
                FieldSpec::required("token_hash", Text).unique(),
                FieldSpec::required("expires_at", Timestamp),
                FieldSpec::required("created_at", Timestamp).default_sql("now()"),
                FieldSpec::optional("created_by_ip", Text),
                FieldSpec::optional("revoked_at", Timestamp),
            ],
            Entity::Department => vec![
                FieldSpec::required("name", Text).unique(),
                FieldSpec::optional("description", Text),
                FieldSpec::required("created_at", Timestamp).default_sql("now()"),
                FieldSpec::required("updated_at", Timestamp).default_sql("now()"),
            ],
            Entity::Employee => vec![
                FieldSpec::required("employee_code", Text).unique(),
                FieldSpec::required("position", Text),
                FieldSpec::required("hire_date", Timestamp),
                FieldSpec::required("status", Text).default_sql("'Active'"),
                FieldSpec::required("created_at", Timestamp).default_sql("now()"),
                FieldSpec::required("updated_at", Timestamp).default_sql("now()"),
            ],
            Entity::Request => vec![
                FieldSpec::required("request_type", Text),
                FieldSpec::required("status", Text).default_sql("'Pending'"),
                FieldSpec::optional("description", Text),
                FieldSpec::required("created_at", Timestamp).default_sql("now()"),
                FieldSpec::required("updated_at", Timestamp).default_sql("now()"),
            ],
            Entity::RequestItem => vec![
                FieldSpec::required("name", Text),
                FieldSpec::required("quantity", Integer).default_sql("1"),
                FieldSpec::required("created_at", Timestamp).default_sql("now()"),
            ],
            Entity::Workflow => vec![
                FieldSpec::required("workflow_type", Text),
                FieldSpec::required("details", Json).default_sql("'{}'::jsonb"),
                FieldSpec::required("status", Text).default_sql("'Pending'"),
                FieldSpec::required("created_at", Timestamp).default_sql("now()"),
                FieldSpec::required("updated_at", Timestamp).default_sql("now()"),
            ],
        }
    }
}

struct RelationDecl {
    owner: Entity,
    dependent: Entity,
    foreign_key: &'static str,
    on_delete: OnDelete,
    cardinality: Cardinality,
    alias: Option<&'static str>,
    inverse_alias: Option<&'static str>,
}

const fn rel(
    owner: Entity,
    dependent: Entity,
    foreign_key: &'static str,
    on_delete: OnDelete,
    cardinality: Cardinality,
) -> RelationDecl {
    RelationDecl {
        owner,
        dependent,
        foreign_key,
        on_delete,
        cardinality,
        alias: None,
        inverse_alias: None,
    }
}

const RELATIONS: [RelationDecl; 7] = [
    rel(
        Entity::Account,
        Entity::RefreshToken,
        "account_id",
        OnDelete::Cascade,
        Cardinality::OneToMany,
    ),
    rel(
        Entity::Account,
        Entity::Employee,
        "account_id",
        OnDelete::Cascade,
        Cardinality::OneToOne,
    ),
    rel(
        Entity::Department,
        Entity::Employee,
        "department_id",
        OnDelete::Nullify,
        Cardinality::OneToMany,
    ),
    rel(
        Entity::Employee,
        Entity::Workflow,
        "employee_id",
        OnDelete::Cascade,
        Cardinality::OneToMany,
    ),
    rel(
        Entity::Employee,
        Entity::Request,
        "employee_id",
        OnDelete::Cascade,
        Cardinality::OneToMany,
    ),
    rel(
        Entity::Request,
        Entity::RequestItem,
        "request_id",
        OnDelete::Cascade,
        Cardinality::OneToMany,
    ),
    RelationDecl {
        alias: Some("ApprovedRequests"),
        inverse_alias: Some("Approver"),
        ..rel(
            Entity::Account,
            Entity::Request,
            "approver_id",
            OnDelete::Nullify,
            Cardinality::OneToMany,
        )
    },
];

/// Builds and validates the registry for every entity of the system.
pub fn build() -> Result<SchemaRegistry, SchemaError> {
    let mut registry = SchemaRegistry::new();
    let mut handles: HashMap<Entity, EntityId> = HashMap::new();

    for entity in Entity::ALL {
        let id = registry.define(entity.name(), entity.fields())?;
        handles.insert(entity, id);
    }

    for decl in &RELATIONS {
        let owner = handles[&decl.owner];
        let dependent = handles[&decl.dependent];
        registry.relate(
            owner,
            dependent,
            RelationOptions {
                foreign_key: decl.foreign_key,
                on_delete: decl.on_delete,
                cardinality: decl.cardinality,
                alias: decl.alias,
                inverse_alias: decl.inverse_alias,
            },
        )?;
    }

    registry.validate()?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(registry: &SchemaRegistry, entity: Entity) -> EntityId {
        registry.lookup(entity.name()).unwrap()
    }

    #[test]
    fn test_catalog_builds() {
        let registry = build().expect("catalog should be valid");
        assert_eq!(registry.entities().count(), 7);
        assert_eq!(registry.relations().len(), 7);
    }

    #[test]
    fn test_only_two_optional_foreign_keys() {
        let registry = build().unwrap();
        let mut optional: Vec<(String, &str)> = registry
            .relations()
            .iter()
            .filter(|r| r.is_optional())
            .map(|r| (registry.entity(r.dependent).name().to_string(), r.foreign_key))
            .collect();
        optional.sort();

        assert_eq!(
            optional,
            vec![
                ("Employee".to_string(), "department_id"),
                ("Request".to_string(), "approver_id"),
            ]
        );
    }

    #[test]
    fn test_request_has_two_independent_account_links() {
        let registry = build().unwrap();
        let request = id(&registry, Entity::Request);
        let account = id(&registry, Entity::Account);
        let employee = id(&registry, Entity::Employee);

        let approver = registry.relation_named(request, "Approver").unwrap();
        assert_eq!(approver.owner, account);
        assert_eq!(approver.foreign_key, "approver_id");

        let submitter = registry.relation_named(request, "Employee").unwrap();
        assert_eq!(submitter.owner, employee);
        assert_eq!(submitter.foreign_key, "employee_id");

        let approved = registry.relation_named(account, "ApprovedRequests").unwrap();
        assert_eq!(approved.id, approver.id);
    }

    #[test]
    fn test_employee_account_link_is_one_to_one() {
        let registry = build().unwrap();
        let employee = id(&registry, Entity::Employee);
        let relation = registry.foreign_key(employee, "account_id").unwrap();
        assert_eq!(relation.cardinality, Cardinality::OneToOne);
        assert_eq!(relation.on_delete, OnDelete::Cascade);
    }

    #[test]
    fn test_tables_are_named_per_entity() {
        let registry = build().unwrap();
        let tables: Vec<&str> = registry.entities().map(|(_, e)| e.table()).collect();
        assert_eq!(
            tables,
            vec![
                "accounts",
                "refresh_tokens",
                "departments",
                "employees",
                "requests",
                "request_items",
                "workflows"
            ]
        );
    }
}
