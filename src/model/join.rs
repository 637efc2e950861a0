//! Cube join definitions.

use super::dimension::ExprResolver;
use crate::sql::select::JoinType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relationship {
    BelongsTo,
    HasOne,
    HasMany,
    BelongsToMany,
}

impl Relationship {
    /// `belongsTo→INNER`, everything else `→LEFT`, unless the join
    /// overrides it explicitly.
    pub fn default_join_type(&self) -> JoinType {
        match self {
            Relationship::BelongsTo => JoinType::Inner,
            Relationship::HasOne | Relationship::HasMany | Relationship::BelongsToMany => JoinType::Left,
        }
    }

    /// Reaching the target through this relationship risks fan-out and so
    /// requires pre-aggregation when a measure is selected.
    pub fn is_many_side(&self) -> bool {
        matches!(self, Relationship::HasMany | Relationship::BelongsToMany)
    }

    /// The relationship as seen from the other cube. A join is declared on
    /// one side only; traversing it backward during BFS
    /// needs the inverse relationship to decide CTE materialization
    /// correctly from whichever direction the planner approached it.
    pub fn reverse(&self) -> Relationship {
        match self {
            Relationship::BelongsTo => Relationship::HasMany,
            Relationship::HasOne => Relationship::BelongsTo,
            Relationship::HasMany => Relationship::BelongsTo,
            Relationship::BelongsToMany => Relationship::BelongsToMany,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JoinKeyPair {
    pub source_col: String,
    pub target_col: String,
}

/// `through = { table, sourceKey[], targetKey[], securitySql? }` for
/// `belongsToMany`.
#[derive(Clone)]
pub struct ThroughJoin {
    pub table: String,
    pub source_key: Vec<String>,
    pub target_key: Vec<String>,
    pub security_sql: Option<ExprResolver>,
}

impl std::fmt::Debug for ThroughJoin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThroughJoin")
            .field("table", &self.table)
            .field("source_key", &self.source_key)
            .field("target_key", &self.target_key)
            .field("security_sql", &self.security_sql.is_some())
            .finish()
    }
}

#[derive(Clone)]
pub struct CubeJoin {
    pub target_cube: String,
    pub relationship: Relationship,
    pub on: Vec<JoinKeyPair>,
    pub sql_join_type: Option<JoinType>,
    pub through: Option<ThroughJoin>,
}

impl CubeJoin {
    pub fn new(target_cube: impl Into<String>, relationship: Relationship, on: Vec<JoinKeyPair>) -> Self {
        Self {
            target_cube: target_cube.into(),
            relationship,
            on,
            sql_join_type: None,
            through: None,
        }
    }

    pub fn through(mut self, through: ThroughJoin) -> Self {
        self.through = Some(through);
        self
    }

    pub fn join_type(&self) -> JoinType {
        self.sql_join_type.unwrap_or_else(|| self.relationship.default_join_type())
    }

    /// Build the equivalent join as seen from `target_cube`'s side - used
    /// when the BFS join search reaches a cube by walking a
    /// join declared on the *other* end.
    pub fn reversed(&self, from_cube: impl Into<String>) -> CubeJoin {
        CubeJoin {
            target_cube: from_cube.into(),
            relationship: self.relationship.reverse(),
            on: self
                .on
                .iter()
                .map(|pair| JoinKeyPair {
                    source_col: pair.target_col.clone(),
                    target_col: pair.source_col.clone(),
                })
                .collect(),
            sql_join_type: None,
            through: self.through.as_ref().map(|t| ThroughJoin {
                table: t.table.clone(),
                source_key: t.target_key.clone(),
                target_key: t.source_key.clone(),
                security_sql: t.security_sql.clone(),
            }),
        }
    }
}

impl std::fmt::Debug for CubeJoin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CubeJoin")
            .field("target_cube", &self.target_cube)
            .field("relationship", &self.relationship)
            .field("on", &self.on)
            .field("through", &self.through)
            .finish()
    }
}
