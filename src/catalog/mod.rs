//! A minimal in-memory registry of databases and relations, giving pages
//! and indexes stable ids to reference. No persistence, no transactions.

use crate::types::Relation;
use std::collections::HashMap;

/// Dense id of a [`Database`] within a [`Catalog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatabaseId(pub u32);

/// Dense id of a [`Relation`] within a [`Database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationId(pub u32);

#[derive(Debug, Default)]
pub struct Database {
    name: String,
    relations: Vec<Relation>,
    by_name: HashMap<String, RelationId>,
}

impl Database {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), relations: Vec::new(), by_name: HashMap::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_relation(&mut self, relation: Relation) -> RelationId {
        let id = RelationId(self.relations.len() as u32);
        self.by_name.insert(relation.name().to_string(), id);
        self.relations.push(relation);
        id
    }

    pub fn relation(&self, id: RelationId) -> Option<&Relation> {
        self.relations.get(id.0 as usize)
    }

    pub fn relation_by_name(&self, name: &str) -> Option<(RelationId, &Relation)> {
        self.by_name.get(name).map(|&id| (id, &self.relations[id.0 as usize]))
    }
}

#[derive(Debug, Default)]
pub struct Catalog {
    databases: Vec<Database>,
    by_name: HashMap<String, DatabaseId>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_database(&mut self, name: impl Into<String>) -> DatabaseId {
        let name = name.into();
        let id = DatabaseId(self.databases.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.databases.push(Database::new(name));
        id
    }

    pub fn database(&self, id: DatabaseId) -> Option<&Database> {
        self.databases.get(id.0 as usize)
    }

    pub fn database_mut(&mut self, id: DatabaseId) -> Option<&mut Database> {
        self.databases.get_mut(id.0 as usize)
    }

    pub fn database_by_name(&self, name: &str) -> Option<(DatabaseId, &Database)> {
        self.by_name.get(name).map(|&id| (id, &self.databases[id.0 as usize]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Attribute, Type};

    #[test]
    fn registers_databases_and_relations_by_dense_id() {
        let mut catalog = Catalog::new();
        let db_id = catalog.add_database("bench");
        let db = catalog.database_mut(db_id).unwrap();
        let rel_id = db.add_relation(Relation::new("t", vec![Attribute::new(0, Type::Long, false)]));
        assert_eq!(db.relation(rel_id).unwrap().name(), "t");
        assert_eq!(catalog.database_by_name("bench").unwrap().0, db_id);
    }
}
