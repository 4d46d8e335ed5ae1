//! Global catalog of database objects

mod builder;
mod catalog;

pub use builder::CatalogBuilder;
pub use catalog::{
    Catalog, CatalogObject, Column, Database, QualifiedName, Routine, Schema, Synonym, Table, View,
};
