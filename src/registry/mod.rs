//! Declarative relational schema.
//!
//! A [`SchemaRegistry`] is built once at startup from explicit entity and
//! relationship declarations. It performs no I/O: the store consults it to
//! generate DDL, plan synchronization, apply delete policies and resolve
//! traversal names.

pub mod cascade;
pub mod catalog;
pub mod ddl;
pub mod sync;

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

pub use cascade::CascadePlan;
pub use catalog::Entity;
pub use sync::{LiveSchema, SyncAction, SyncError, SyncOptions, SyncPlan};

/// Storage type of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Boolean,
    Timestamp,
    Uuid,
    Json,
}

impl FieldType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldType::Text => "VARCHAR",
            FieldType::Integer => "INTEGER",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Timestamp => "TIMESTAMP",
            FieldType::Uuid => "UUID",
            FieldType::Json => "JSONB",
        }
    }

    /// Whether a `data_type` reported by `information_schema.columns` is
    /// compatible with this field type.
    pub fn accepts(&self, data_type: &str) -> bool {
        let data_type = data_type.to_ascii_lowercase();
        match self {
            FieldType::Text => matches!(data_type.as_str(), "character varying" | "text"),
            FieldType::Integer => data_type == "integer",
            FieldType::Boolean => data_type == "boolean",
            FieldType::Timestamp => data_type == "timestamp without time zone",
            FieldType::Uuid => data_type == "uuid",
            FieldType::Json => data_type == "jsonb",
        }
    }

    /// The `data_type` string postgres reports for columns created with
    /// [`FieldType::sql_type`].
    pub fn reported_name(&self) -> &'static str {
        match self {
            FieldType::Text => "character varying",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Timestamp => "timestamp without time zone",
            FieldType::Uuid => "uuid",
            FieldType::Json => "jsonb",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    pub nullable: bool,
    pub unique: bool,
    pub default: Option<&'static str>,
}

impl FieldSpec {
    pub const fn required(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
            unique: false,
            default: None,
        }
    }

    pub const fn optional(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            nullable: true,
            unique: false,
            default: None,
        }
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets a raw SQL default expression, e.g. `now()` or `'Pending'`.
    pub const fn default_sql(mut self, expr: &'static str) -> Self {
        self.default = Some(expr);
        self
    }
}

/// Handle returned by [`SchemaRegistry::define`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(usize);

/// Handle returned by [`SchemaRegistry::relate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelationId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    Cascade,
    Nullify,
}

impl OnDelete {
    pub fn sql(&self) -> &'static str {
        match self {
            OnDelete::Cascade => "CASCADE",
            OnDelete::Nullify => "SET NULL",
        }
    }
}

impl fmt::Display for OnDelete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnDelete::Cascade => f.write_str("cascade"),
            OnDelete::Nullify => f.write_str("nullify"),
        }
    }
}

/// Count of dependents per owner.
///
/// `ManyToOne` is the same storage shape as `OneToMany`, declared from the
/// dependent's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
}

#[derive(Debug, Clone)]
pub struct RelationOptions {
    pub foreign_key: &'static str,
    pub on_delete: OnDelete,
    pub cardinality: Cardinality,
    /// Name of the owner -> dependents traversal.
    pub alias: Option<&'static str>,
    /// Name of the dependent -> owner traversal.
    pub inverse_alias: Option<&'static str>,
}

#[derive(Debug, Clone)]
pub struct EntityDef {
    name: String,
    table: String,
    fields: Vec<FieldSpec>,
}

impl EntityDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub id: RelationId,
    pub owner: EntityId,
    pub dependent: EntityId,
    pub foreign_key: &'static str,
    pub on_delete: OnDelete,
    pub cardinality: Cardinality,
    pub owner_side: String,
    pub dependent_side: String,
}

impl Relation {
    /// Nullify relations are the only optional links.
    pub fn is_optional(&self) -> bool {
        self.on_delete == OnDelete::Nullify
    }
}

/// What a named storage constraint protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintTarget<'a> {
    Unique { entity: EntityId, column: &'a str },
    ForeignKey(&'a Relation),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("entity '{0}' is already registered")]
    DuplicateEntity(String),

    #[error("entity '{0}' is not registered")]
    UnknownEntity(String),

    #[error("entity '{entity}' declares field '{field}' more than once")]
    DuplicateField { entity: String, field: String },

    #[error("entity '{entity}' cannot declare reserved field '{field}'")]
    ReservedField { entity: String, field: String },

    #[error("foreign key '{foreign_key}' collides with an existing column of '{entity}'")]
    ForeignKeyCollision { entity: String, foreign_key: String },

    #[error("relationship name '{name}' is declared twice on '{entity}'")]
    DuplicateRelationName { entity: String, name: String },

    #[error("cascade cycle: {}", .path.join(" -> "))]
    CascadeCycle { path: Vec<String> },
}

#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entities: Vec<EntityDef>,
    relations: Vec<Relation>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity and returns its handle.
    pub fn define(
        &mut self,
        name: &str,
        fields: Vec<FieldSpec>,
    ) -> Result<EntityId, SchemaError> {
        if self.lookup(name).is_some() {
            return Err(SchemaError::DuplicateEntity(name.to_string()));
        }

        let mut seen = BTreeSet::new();
        for field in &fields {
            if field.name == "id" {
                return Err(SchemaError::ReservedField {
                    entity: name.to_string(),
                    field: field.name.to_string(),
                });
            }
            if !seen.insert(field.name) {
                return Err(SchemaError::DuplicateField {
                    entity: name.to_string(),
                    field: field.name.to_string(),
                });
            }
        }

        let id = EntityId(self.entities.len());
        self.entities.push(EntityDef {
            name: name.to_string(),
            table: table_name(name),
            fields,
        });
        Ok(id)
    }

    /// Declares that `dependent` rows reference `owner` rows through
    /// `options.foreign_key`, with an explicit delete policy.
    pub fn relate(
        &mut self,
        owner: EntityId,
        dependent: EntityId,
        options: RelationOptions,
    ) -> Result<RelationId, SchemaError> {
        let owner_name = self.checked(owner)?.name.clone();
        let dependent_def = self.checked(dependent)?;
        let dependent_name = dependent_def.name.clone();

        let collides = options.foreign_key == "id"
            || dependent_def
                .fields
                .iter()
                .any(|f| f.name == options.foreign_key)
            || self
                .relations
                .iter()
                .any(|r| r.dependent == dependent && r.foreign_key == options.foreign_key);
        if collides {
            return Err(SchemaError::ForeignKeyCollision {
                entity: dependent_name,
                foreign_key: options.foreign_key.to_string(),
            });
        }

        let owner_side = options
            .alias
            .map(str::to_string)
            .unwrap_or_else(|| dependent_name.clone());
        let dependent_side = options
            .inverse_alias
            .map(str::to_string)
            .unwrap_or_else(|| owner_name.clone());

        if self.relation_named(owner, &owner_side).is_some() {
            return Err(SchemaError::DuplicateRelationName {
                entity: owner_name,
                name: owner_side,
            });
        }
        if self.relation_named(dependent, &dependent_side).is_some()
            || (owner == dependent && owner_side == dependent_side)
        {
            return Err(SchemaError::DuplicateRelationName {
                entity: dependent_name,
                name: dependent_side,
            });
        }

        let id = RelationId(self.relations.len());
        self.relations.push(Relation {
            id,
            owner,
            dependent,
            foreign_key: options.foreign_key,
            on_delete: options.on_delete,
            cardinality: options.cardinality,
            owner_side,
            dependent_side,
        });
        Ok(id)
    }

    /// Static checks over the complete declaration set.
    pub fn validate(&self) -> Result<(), SchemaError> {
        for (index, _) in self.entities.iter().enumerate() {
            let start = EntityId(index);
            let mut path = vec![start];
            self.check_cascade_cycle(start, &mut path)?;
        }
        Ok(())
    }

    fn check_cascade_cycle(
        &self,
        current: EntityId,
        path: &mut Vec<EntityId>,
    ) -> Result<(), SchemaError> {
        for relation in self.owned_by(current) {
            if relation.on_delete != OnDelete::Cascade {
                continue;
            }
            if path.contains(&relation.dependent) {
                let mut names: Vec<String> =
                    path.iter().map(|e| self.entity(*e).name.clone()).collect();
                names.push(self.entity(relation.dependent).name.clone());
                return Err(SchemaError::CascadeCycle { path: names });
            }
            path.push(relation.dependent);
            self.check_cascade_cycle(relation.dependent, path)?;
            path.pop();
        }
        Ok(())
    }

    fn checked(&self, id: EntityId) -> Result<&EntityDef, SchemaError> {
        self.entities
            .get(id.0)
            .ok_or_else(|| SchemaError::UnknownEntity(format!("#{}", id.0)))
    }

    pub fn lookup(&self, name: &str) -> Option<EntityId> {
        self.entities
            .iter()
            .position(|e| e.name == name)
            .map(EntityId)
    }

    /// Resolves an entity by name, failing with a [`SchemaError`].
    pub fn require(&self, name: &str) -> Result<EntityId, SchemaError> {
        self.lookup(name)
            .ok_or_else(|| SchemaError::UnknownEntity(name.to_string()))
    }

    /// # Panics
    ///
    /// Panics if `id` was issued by a different registry.
    pub fn entity(&self, id: EntityId) -> &EntityDef {
        &self.entities[id.0]
    }

    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &EntityDef)> {
        self.entities
            .iter()
            .enumerate()
            .map(|(i, e)| (EntityId(i), e))
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn relation(&self, id: RelationId) -> &Relation {
        &self.relations[id.0]
    }

    /// Relationships in which `entity` is the owner.
    pub fn owned_by(&self, entity: EntityId) -> impl Iterator<Item = &Relation> {
        self.relations.iter().filter(move |r| r.owner == entity)
    }

    /// Relationships in which `entity` holds the foreign key.
    pub fn references_of(&self, entity: EntityId) -> impl Iterator<Item = &Relation> {
        self.relations.iter().filter(move |r| r.dependent == entity)
    }

    /// Finds the relationship reachable from `entity` under `name`, from
    /// either side.
    pub fn relation_named(&self, entity: EntityId, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| {
            (r.owner == entity && r.owner_side == name)
                || (r.dependent == entity && r.dependent_side == name)
        })
    }

    pub fn foreign_key(&self, entity: EntityId, column: &str) -> Option<&Relation> {
        self.references_of(entity).find(|r| r.foreign_key == column)
    }

    /// Maps a constraint name produced by [`unique_constraint_name`] or
    /// [`foreign_key_constraint_name`] back to what it protects.
    pub fn constraint(&self, name: &str) -> Option<ConstraintTarget<'_>> {
        for relation in &self.relations {
            let table = &self.entity(relation.dependent).table;
            if foreign_key_constraint_name(table, relation.foreign_key) == name {
                return Some(ConstraintTarget::ForeignKey(relation));
            }
            if relation.cardinality == Cardinality::OneToOne
                && unique_constraint_name(table, relation.foreign_key) == name
            {
                return Some(ConstraintTarget::Unique {
                    entity: relation.dependent,
                    column: relation.foreign_key,
                });
            }
        }

        self.entities().find_map(|(id, def)| {
            def.fields
                .iter()
                .filter(|f| f.unique)
                .find(|f| unique_constraint_name(&def.table, f.name) == name)
                .map(|f| ConstraintTarget::Unique {
                    entity: id,
                    column: f.name,
                })
        })
    }

    pub fn cascade_plan(&self, entity: EntityId) -> CascadePlan {
        CascadePlan::build(self, entity)
    }
}

/// `RequestItem` -> `request_items`.
pub fn table_name(entity: &str) -> String {
    let mut snake = String::with_capacity(entity.len() + 4);
    for (i, ch) in entity.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                snake.push('_');
            }
            snake.push(ch.to_ascii_lowercase());
        } else {
            snake.push(ch);
        }
    }
    snake.push('s');
    snake
}

pub fn unique_constraint_name(table: &str, column: &str) -> String {
    format!("uq_{}_{}", table, column)
}

pub fn foreign_key_constraint_name(table: &str, column: &str) -> String {
    format!("fk_{}_{}", table, column)
}

/// Quotes an identifier for interpolation into SQL.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(fk: &'static str, on_delete: OnDelete) -> RelationOptions {
        RelationOptions {
            foreign_key: fk,
            on_delete,
            cardinality: Cardinality::OneToMany,
            alias: None,
            inverse_alias: None,
        }
    }

    fn two_entities() -> (SchemaRegistry, EntityId, EntityId) {
        let mut registry = SchemaRegistry::new();
        let owner = registry
            .define("Owner", vec![FieldSpec::required("name", FieldType::Text)])
            .unwrap();
        let child = registry
            .define("ChildItem", vec![FieldSpec::required("label", FieldType::Text)])
            .unwrap();
        (registry, owner, child)
    }

    #[test]
    fn test_table_name() {
        assert_eq!(table_name("Account"), "accounts");
        assert_eq!(table_name("RefreshToken"), "refresh_tokens");
        assert_eq!(table_name("RequestItem"), "request_items");
    }

    #[test]
    fn test_define_duplicate_entity_fails() {
        let (mut registry, _, _) = two_entities();
        let err = registry.define("Owner", vec![]).unwrap_err();
        assert_eq!(err, SchemaError::DuplicateEntity("Owner".to_string()));
    }

    #[test]
    fn test_define_rejects_reserved_and_duplicate_fields() {
        let mut registry = SchemaRegistry::new();
        let err = registry
            .define("Thing", vec![FieldSpec::required("id", FieldType::Uuid)])
            .unwrap_err();
        assert!(matches!(err, SchemaError::ReservedField { .. }));

        let err = registry
            .define(
                "Thing",
                vec![
                    FieldSpec::required("name", FieldType::Text),
                    FieldSpec::optional("name", FieldType::Text),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateField { .. }));
    }

    #[test]
    fn test_relate_unknown_entity_fails() {
        let (mut registry, owner, _) = two_entities();
        let err = registry
            .relate(owner, EntityId(42), options("owner_id", OnDelete::Cascade))
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownEntity(_)));
    }

    #[test]
    fn test_relate_foreign_key_collision() {
        let (mut registry, owner, child) = two_entities();

        let err = registry
            .relate(owner, child, options("label", OnDelete::Cascade))
            .unwrap_err();
        assert!(matches!(err, SchemaError::ForeignKeyCollision { .. }));

        registry
            .relate(owner, child, options("owner_id", OnDelete::Cascade))
            .unwrap();
        let err = registry
            .relate(
                owner,
                child,
                RelationOptions {
                    alias: Some("Other"),
                    inverse_alias: Some("OtherOwner"),
                    ..options("owner_id", OnDelete::Nullify)
                },
            )
            .unwrap_err();
        assert!(matches!(err, SchemaError::ForeignKeyCollision { .. }));
    }

    #[test]
    fn test_second_relation_to_same_pair_needs_alias() {
        let (mut registry, owner, child) = two_entities();
        registry
            .relate(owner, child, options("owner_id", OnDelete::Cascade))
            .unwrap();

        let err = registry
            .relate(owner, child, options("reviewer_id", OnDelete::Nullify))
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateRelationName { .. }));

        let id = registry
            .relate(
                owner,
                child,
                RelationOptions {
                    alias: Some("ReviewedItems"),
                    inverse_alias: Some("Reviewer"),
                    ..options("reviewer_id", OnDelete::Nullify)
                },
            )
            .unwrap();

        let reviewed = registry.relation_named(owner, "ReviewedItems").unwrap();
        assert_eq!(reviewed.id, id);
        assert_eq!(registry.relation_named(child, "Reviewer").unwrap().id, id);
        assert_eq!(
            registry.relation_named(child, "Owner").unwrap().foreign_key,
            "owner_id"
        );
    }

    #[test]
    fn test_cascade_cycle_detected() {
        let (mut registry, owner, child) = two_entities();
        registry
            .relate(owner, child, options("owner_id", OnDelete::Cascade))
            .unwrap();
        registry
            .relate(
                child,
                owner,
                RelationOptions {
                    alias: Some("Pinned"),
                    inverse_alias: Some("PinnedBy"),
                    ..options("pinned_child_id", OnDelete::Cascade)
                },
            )
            .unwrap();

        let err = registry.validate().unwrap_err();
        assert!(matches!(err, SchemaError::CascadeCycle { .. }));
    }

    #[test]
    fn test_nullify_back_reference_is_not_a_cycle() {
        let (mut registry, owner, child) = two_entities();
        registry
            .relate(owner, child, options("owner_id", OnDelete::Cascade))
            .unwrap();
        registry
            .relate(
                child,
                owner,
                RelationOptions {
                    alias: Some("Pinned"),
                    inverse_alias: Some("PinnedBy"),
                    ..options("pinned_child_id", OnDelete::Nullify)
                },
            )
            .unwrap();

        assert!(registry.validate().is_ok());
    }

    #[test]
    fn test_constraint_lookup() {
        let mut registry = SchemaRegistry::new();
        let owner = registry
            .define(
                "Owner",
                vec![FieldSpec::required("email", FieldType::Text).unique()],
            )
            .unwrap();
        let child = registry.define("Child", vec![]).unwrap();
        registry
            .relate(
                owner,
                child,
                RelationOptions {
                    cardinality: Cardinality::OneToOne,
                    ..options("owner_id", OnDelete::Cascade)
                },
            )
            .unwrap();

        assert_eq!(
            registry.constraint("uq_owners_email"),
            Some(ConstraintTarget::Unique {
                entity: owner,
                column: "email"
            })
        );
        assert_eq!(
            registry.constraint("uq_childs_owner_id"),
            Some(ConstraintTarget::Unique {
                entity: child,
                column: "owner_id"
            })
        );
        assert!(matches!(
            registry.constraint("fk_childs_owner_id"),
            Some(ConstraintTarget::ForeignKey(r)) if r.owner == owner
        ));
        assert!(registry.constraint("pk_whatever").is_none());
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("accounts"), "\"accounts\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
