//! The process-wide, read-only cube registry.

use std::collections::HashMap;

use super::cube::Cube;
use crate::error::{CompileError, Result};

/// Holds every [`Cube`] known to a compiler instance. Constructed once at
/// startup and never mutated afterwards - safe to share across threads.
#[derive(Debug, Default)]
pub struct CubeRegistry {
    cubes: Vec<Cube>,
    index: HashMap<String, usize>,
}

impl CubeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, cube: Cube) {
        let idx = self.cubes.len();
        self.index.insert(cube.name.clone(), idx);
        self.cubes.push(cube);
    }

    pub fn get(&self, name: &str) -> Option<&Cube> {
        self.index.get(name).map(|&i| &self.cubes[i])
    }

    pub fn require(&self, name: &str) -> Result<&Cube> {
        self.get(name).ok_or_else(|| CompileError::UnknownMember(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cube> {
        self.cubes.iter()
    }

    /// Registration order - the tie-break for primary-cube selection.
    pub fn order_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Parse `"Cube.member"` and resolve the cube, rejecting unknown
    /// references before planning begins.
    pub fn resolve_member<'a>(&'a self, qualified: &'a str) -> Result<(&'a Cube, &'a str)> {
        let (cube_name, member) = qualified
            .split_once('.')
            .ok_or_else(|| CompileError::UnknownMember(qualified.to_string()))?;
        let cube = self.require(cube_name)?;
        Ok((cube, member))
    }
}
