//! Static view of what deleting a row of a given entity touches.

use super::{EntityId, OnDelete, RelationId, SchemaRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadePlan {
    pub root: EntityId,
    /// Entities whose rows may be removed, in depth-first order, root excluded.
    pub removes: Vec<EntityId>,
    /// Relationships whose foreign keys are set to null.
    pub nullifies: Vec<RelationId>,
}

impl CascadePlan {
    pub(super) fn build(registry: &SchemaRegistry, root: EntityId) -> Self {
        let mut plan = CascadePlan {
            root,
            removes: Vec::new(),
            nullifies: Vec::new(),
        };
        plan.visit(registry, root);
        plan
    }

    fn visit(&mut self, registry: &SchemaRegistry, entity: EntityId) {
        for relation in registry.owned_by(entity) {
            match relation.on_delete {
                OnDelete::Nullify => {
                    if !self.nullifies.contains(&relation.id) {
                        self.nullifies.push(relation.id);
                    }
                }
                OnDelete::Cascade => {
                    if relation.dependent == self.root || self.removes.contains(&relation.dependent)
                    {
                        continue;
                    }
                    self.removes.push(relation.dependent);
                    self.visit(registry, relation.dependent);
                }
            }
        }
    }

    pub fn removes_entity(&self, entity: EntityId) -> bool {
        self.removes.contains(&entity)
    }

    pub fn is_leaf(&self) -> bool {
        self.removes.is_empty() && self.nullifies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::registry::catalog::{self, Entity};

    fn names(registry: &crate::registry::SchemaRegistry, plan: &super::CascadePlan) -> Vec<String> {
        let mut names: Vec<String> = plan
            .removes
            .iter()
            .map(|e| registry.entity(*e).name().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_account_delete_reaches_everything_it_owns() {
        let registry = catalog::build().unwrap();
        let account = registry.require(Entity::Account.name()).unwrap();
        let plan = registry.cascade_plan(account);

        assert_eq!(
            names(&registry, &plan),
            vec!["Employee", "RefreshToken", "Request", "RequestItem", "Workflow"]
        );

        let nullified: Vec<&str> = plan
            .nullifies
            .iter()
            .map(|r| registry.relation(*r).foreign_key)
            .collect();
        assert_eq!(nullified, vec!["approver_id"]);
    }

    #[test]
    fn test_department_delete_never_removes_employees() {
        let registry = catalog::build().unwrap();
        let department = registry.require(Entity::Department.name()).unwrap();
        let employee = registry.require(Entity::Employee.name()).unwrap();
        let plan = registry.cascade_plan(department);

        assert!(plan.removes.is_empty());
        assert!(!plan.removes_entity(employee));
        assert_eq!(plan.nullifies.len(), 1);
        assert_eq!(registry.relation(plan.nullifies[0]).foreign_key, "department_id");
    }

    #[test]
    fn test_employee_delete_keeps_account_and_department() {
        let registry = catalog::build().unwrap();
        let employee = registry.require(Entity::Employee.name()).unwrap();
        let plan = registry.cascade_plan(employee);

        assert_eq!(
            names(&registry, &plan),
            vec!["Request", "RequestItem", "Workflow"]
        );
        assert!(plan.nullifies.is_empty());
    }

    #[test]
    fn test_leaf_entities() {
        let registry = catalog::build().unwrap();
        for entity in [Entity::RefreshToken, Entity::RequestItem, Entity::Workflow] {
            let id = registry.require(entity.name()).unwrap();
            assert!(registry.cascade_plan(id).is_leaf(), "{:?}", entity);
        }
    }
}
