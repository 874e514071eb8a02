//! Finds the target type and its identifier member, and reads the value
//!
//! Lookups go through [`TypeCatalog`], so the resolution rules (entity first,
//! then a field, then a property) are independent of how types are stored.

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::config::ProbeConfig;
use crate::eval::{EvalError, StaticEvaluator, StaticValue};
use crate::metadata::{Assembly, MetadataError, TableId};

/// How a member exposes its value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Field,
    Property,
}

impl MemberKind {
    /// Representations tried in order; the first one found wins
    pub const SEARCH_ORDER: [MemberKind; 2] = [MemberKind::Field, MemberKind::Property];
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberKind::Field => write!(f, "field"),
            MemberKind::Property => write!(f, "property"),
        }
    }
}

/// Opaque handle to a type inside a catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeHandle(pub u32);

/// Opaque handle to a member inside a catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberHandle {
    pub kind: MemberKind,
    pub index: u32,
}

/// The identifier that was found: which representation produced it, and its value
#[derive(Debug, Clone, PartialEq)]
pub struct IdentifierValue {
    pub kind: MemberKind,
    pub value: StaticValue,
}

impl IdentifierValue {
    /// Canonical text of the value; nulls render as `<null>`
    pub fn text(&self) -> String {
        self.value.to_string()
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Type {entity} not found in assembly")]
    EntityNotFound {
        entity: String,
        candidates: Vec<String>,
    },

    #[error("No static {member} field or property found on {entity}.")]
    MemberNotFound { entity: String, member: String },

    #[error("{0}")]
    Metadata(#[from] MetadataError),

    #[error("{0}")]
    Evaluation(#[from] EvalError),
}

/// Read access to the types of a loaded artifact
pub trait TypeCatalog {
    /// Looks a type up by its full name (`Namespace.Name`, `Outer+Inner`)
    fn find_type(&self, full_name: &str) -> Result<Option<TypeHandle>, ResolveError>;

    /// Full names of at most `limit` types, in definition order
    fn type_names(&self, limit: usize) -> Result<Vec<String>, ResolveError>;

    /// A public static member of the given kind declared directly on `entity`
    fn find_static_member(
        &self,
        entity: TypeHandle,
        name: &str,
        kind: MemberKind,
    ) -> Result<Option<MemberHandle>, ResolveError>;

    /// Reads the member's value with no arguments and no instance
    fn read_value(&self, entity: TypeHandle, member: MemberHandle)
        -> Result<StaticValue, ResolveError>;
}

pub struct MemberResolver {
    entity_name: String,
    member_name: String,
    candidate_limit: usize,
}

impl MemberResolver {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            entity_name: config.entity_name.clone(),
            member_name: config.member_name.clone(),
            candidate_limit: config.candidate_limit,
        }
    }

    pub fn resolve<C: TypeCatalog + ?Sized>(
        &self,
        catalog: &C,
    ) -> Result<IdentifierValue, ResolveError> {
        let entity = match catalog.find_type(&self.entity_name)? {
            Some(entity) => entity,
            None => {
                return Err(ResolveError::EntityNotFound {
                    entity: self.entity_name.clone(),
                    candidates: catalog.type_names(self.candidate_limit)?,
                })
            }
        };
        debug!(entity = %self.entity_name, "Found target type");

        for kind in MemberKind::SEARCH_ORDER {
            let Some(member) = catalog.find_static_member(entity, &self.member_name, kind)? else {
                continue;
            };
            debug!(member = %self.member_name, kind = %kind, "Found identifier member");
            let value = catalog.read_value(entity, member)?;
            return Ok(IdentifierValue { kind, value });
        }

        Err(ResolveError::MemberNotFound {
            entity: self.entity_name.clone(),
            member: self.member_name.clone(),
        })
    }
}

impl TypeCatalog for Assembly {
    fn find_type(&self, full_name: &str) -> Result<Option<TypeHandle>, ResolveError> {
        Ok(self.metadata()?.find_type(full_name)?.map(TypeHandle))
    }

    fn type_names(&self, limit: usize) -> Result<Vec<String>, ResolveError> {
        let mut names = self.metadata()?.type_names()?;
        names.truncate(limit);
        Ok(names)
    }

    fn find_static_member(
        &self,
        entity: TypeHandle,
        name: &str,
        kind: MemberKind,
    ) -> Result<Option<MemberHandle>, ResolveError> {
        let metadata = self.metadata()?;
        let tables = &metadata.tables;

        match kind {
            MemberKind::Field => {
                for row in tables.type_fields(entity.0)? {
                    let field = tables.field(row)?;
                    if field.is_public() && field.is_static() && metadata.field_name(row)? == name {
                        return Ok(Some(MemberHandle { kind, index: row }));
                    }
                }
            }
            MemberKind::Property => {
                for row in tables.type_properties(entity.0)? {
                    if metadata.property_name(row)? != name {
                        continue;
                    }
                    let Some(getter) = tables.property_getter(row)? else {
                        continue;
                    };
                    let method = tables.method_def(getter)?;
                    if method.is_public() && method.is_static() {
                        return Ok(Some(MemberHandle { kind, index: row }));
                    }
                }
            }
        }
        Ok(None)
    }

    fn read_value(
        &self,
        entity: TypeHandle,
        member: MemberHandle,
    ) -> Result<StaticValue, ResolveError> {
        let metadata = self.metadata()?;
        if entity.0 == 0 || entity.0 > metadata.tables.row_count(TableId::TypeDef) {
            return Err(MetadataError::RowOutOfRange {
                table: TableId::TypeDef.name(),
                row: entity.0,
                count: metadata.tables.row_count(TableId::TypeDef),
            }
            .into());
        }
        let evaluator = StaticEvaluator::new(&metadata, entity.0)?;
        let value = match member.kind {
            MemberKind::Field => evaluator.field_value(member.index)?,
            MemberKind::Property => evaluator.property_value(member.index)?,
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// In-memory catalog: types with their public static members
    #[derive(Default)]
    struct MockCatalog {
        types: Vec<MockType>,
    }

    struct MockType {
        name: String,
        members: Vec<(MemberKind, String, StaticValue)>,
    }

    impl MockCatalog {
        fn with_type(mut self, name: &str, members: Vec<(MemberKind, &str, StaticValue)>) -> Self {
            self.types.push(MockType {
                name: name.to_string(),
                members: members
                    .into_iter()
                    .map(|(kind, name, value)| (kind, name.to_string(), value))
                    .collect(),
            });
            self
        }
    }

    impl TypeCatalog for MockCatalog {
        fn find_type(&self, full_name: &str) -> Result<Option<TypeHandle>, ResolveError> {
            Ok(self
                .types
                .iter()
                .position(|t| t.name == full_name)
                .map(|i| TypeHandle(i as u32)))
        }

        fn type_names(&self, limit: usize) -> Result<Vec<String>, ResolveError> {
            Ok(self.types.iter().take(limit).map(|t| t.name.clone()).collect())
        }

        fn find_static_member(
            &self,
            entity: TypeHandle,
            name: &str,
            kind: MemberKind,
        ) -> Result<Option<MemberHandle>, ResolveError> {
            Ok(self.types[entity.0 as usize]
                .members
                .iter()
                .position(|(k, n, _)| *k == kind && n == name)
                .map(|i| MemberHandle {
                    kind,
                    index: i as u32,
                }))
        }

        fn read_value(
            &self,
            entity: TypeHandle,
            member: MemberHandle,
        ) -> Result<StaticValue, ResolveError> {
            Ok(self.types[entity.0 as usize].members[member.index as usize]
                .2
                .clone())
        }
    }

    fn guid(text: &str) -> StaticValue {
        StaticValue::Guid(Uuid::parse_str(text).unwrap())
    }

    fn resolver() -> MemberResolver {
        MemberResolver::new(&ProbeConfig::default())
    }

    #[test]
    fn test_field_member() {
        let catalog = MockCatalog::default().with_type(
            "WinCopyS3.ETWEvents",
            vec![(
                MemberKind::Field,
                "ProviderGuid",
                guid("123e4567-e89b-12d3-a456-426614174000"),
            )],
        );

        let found = resolver().resolve(&catalog).unwrap();
        assert_eq!(found.kind, MemberKind::Field);
        assert_eq!(found.text(), "123e4567-e89b-12d3-a456-426614174000");
    }

    #[test]
    fn test_property_member() {
        let catalog = MockCatalog::default().with_type(
            "WinCopyS3.ETWEvents",
            vec![(
                MemberKind::Property,
                "ProviderGuid",
                guid("00000000-0000-0000-0000-000000000001"),
            )],
        );

        let found = resolver().resolve(&catalog).unwrap();
        assert_eq!(found.kind, MemberKind::Property);
        assert_eq!(found.kind.to_string(), "property");
    }

    #[test]
    fn test_field_wins_over_property() {
        let catalog = MockCatalog::default().with_type(
            "WinCopyS3.ETWEvents",
            vec![
                (
                    MemberKind::Property,
                    "ProviderGuid",
                    guid("00000000-0000-0000-0000-000000000002"),
                ),
                (
                    MemberKind::Field,
                    "ProviderGuid",
                    guid("00000000-0000-0000-0000-000000000001"),
                ),
            ],
        );

        let found = resolver().resolve(&catalog).unwrap();
        assert_eq!(found.kind, MemberKind::Field);
        assert_eq!(found.text(), "00000000-0000-0000-0000-000000000001");
    }

    #[test]
    fn test_null_value_renders_placeholder() {
        let catalog = MockCatalog::default().with_type(
            "WinCopyS3.ETWEvents",
            vec![(MemberKind::Field, "ProviderGuid", StaticValue::Null)],
        );

        assert_eq!(resolver().resolve(&catalog).unwrap().text(), "<null>");
    }

    #[test]
    fn test_entity_not_found_caps_candidates() {
        let mut catalog = MockCatalog::default();
        for i in 0..75 {
            catalog = catalog.with_type(&format!("Other.Type{}", i), Vec::new());
        }

        match resolver().resolve(&catalog).unwrap_err() {
            ResolveError::EntityNotFound { entity, candidates } => {
                assert_eq!(entity, "WinCopyS3.ETWEvents");
                assert_eq!(candidates.len(), 50);
                assert_eq!(candidates[0], "Other.Type0");
                assert_eq!(candidates[49], "Other.Type49");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_member_not_found() {
        let catalog = MockCatalog::default().with_type(
            "WinCopyS3.ETWEvents",
            vec![(MemberKind::Field, "SomethingElse", StaticValue::Int(1))],
        );

        let err = resolver().resolve(&catalog).unwrap_err();
        assert!(matches!(err, ResolveError::MemberNotFound { .. }));
        assert_eq!(
            err.to_string(),
            "No static ProviderGuid field or property found on WinCopyS3.ETWEvents."
        );
    }

    #[test]
    fn test_custom_names() {
        let config = ProbeConfig {
            entity_name: "Ns.Target".to_string(),
            member_name: "Id".to_string(),
            ..Default::default()
        };
        let catalog = MockCatalog::default()
            .with_type("Ns.Other", vec![(MemberKind::Field, "Id", StaticValue::Int(1))])
            .with_type("Ns.Target", vec![(MemberKind::Field, "Id", StaticValue::Int(2))]);

        let found = MemberResolver::new(&config).resolve(&catalog).unwrap();
        assert_eq!(found.value, StaticValue::Int(2));
    }
}
