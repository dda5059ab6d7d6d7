//! Owned particle records outside container storage.
//!
//! A [`ParticleBatch`] is the exchange format between a container and
//! the outside world: construction input, rebuild arrivals, decoded
//! migration payloads, and checkpoint contents. Columns use the same
//! `index * components + c` layout as block storage, so a batch record
//! copies into a block lane field by field.

use indexmap::IndexSet;

use corral_core::{
    Column, ConstructionError, ElementGid, Field, FieldKey, FieldType, ParticleId, Schema,
    SchemaError,
};

use crate::view::check_handle;

/// Particles with their destination elements and full field tuples.
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleBatch {
    schema: Schema,
    elements: Vec<usize>,
    columns: Vec<Column>,
}

impl ParticleBatch {
    /// An empty batch for `schema`.
    pub fn new(schema: Schema) -> Self {
        Self::with_capacity(schema, 0)
    }

    /// An empty batch with room for `n` particles.
    pub fn with_capacity(schema: Schema, n: usize) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|def| {
                let mut col = Column::zeroed(def.kind, 0);
                reserve(&mut col, n * def.components as usize);
                col
            })
            .collect();
        Self {
            schema,
            elements: Vec::with_capacity(n),
            columns,
        }
    }

    /// Build a batch from prepared columns, one per schema field
    /// (`pid` first).
    pub fn from_columns(
        schema: Schema,
        elements: Vec<usize>,
        columns: Vec<Column>,
    ) -> Result<Self, ConstructionError> {
        if columns.len() != schema.len() {
            return Err(ConstructionError::LengthMismatch {
                what: "columns",
                expected: schema.len(),
                found: columns.len(),
            });
        }
        for (col, def) in columns.iter().zip(schema.fields()) {
            if col.kind() != def.kind {
                return Err(SchemaError::KindMismatch {
                    name: def.name.clone(),
                    stored: def.kind,
                    requested: col.kind(),
                }
                .into());
            }
            let expected = elements.len() * def.components as usize;
            if col.len() != expected {
                return Err(ConstructionError::LengthMismatch {
                    what: "field column",
                    expected,
                    found: col.len(),
                });
            }
        }
        Ok(Self {
            schema,
            elements,
            columns,
        })
    }

    /// The batch's field schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of particles.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the batch holds no particles.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Destination element of every particle.
    pub fn elements(&self) -> &[usize] {
        &self.elements
    }

    /// Identity of particle `index`.
    pub fn pid(&self, index: usize) -> ParticleId {
        ParticleId(self.values(index, self.schema.pid())[0])
    }

    /// Append a particle with all non-pid fields zeroed. Returns its
    /// index.
    pub fn push(&mut self, element: usize, pid: ParticleId) -> usize {
        let index = self.elements.len();
        self.elements.push(element);
        for (col, def) in self.columns.iter_mut().zip(self.schema.fields()) {
            col.extend_zeroed(def.components as usize);
        }
        let pid_field = self.schema.pid();
        self.set(index, pid_field, &[pid.0]);
        index
    }

    /// Components of `field` for particle `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range or `field` was resolved from a
    /// different schema.
    pub fn values<T: FieldType>(&self, index: usize, field: Field<T>) -> &[T] {
        check_handle(&self.schema, field);
        let n = field.components();
        let data = T::slice(&self.columns[field.key().index()])
            .unwrap_or_else(|| panic!("field {} is not {}", field.key().0, T::KIND));
        &data[index * n..(index + 1) * n]
    }

    /// Overwrite the components of `field` for particle `index`.
    ///
    /// # Panics
    ///
    /// Same conditions as [`values`](Self::values), and when `values`
    /// has the wrong length.
    pub fn set<T: FieldType>(&mut self, index: usize, field: Field<T>, values: &[T]) {
        check_handle(&self.schema, field);
        let n = field.components();
        let data = T::slice_mut(&mut self.columns[field.key().index()])
            .unwrap_or_else(|| panic!("field {} is not {}", field.key().0, T::KIND));
        data[index * n..(index + 1) * n].copy_from_slice(values);
    }

    /// Raw column of `key`.
    pub fn column(&self, key: FieldKey) -> &Column {
        &self.columns[key.index()]
    }

    pub(crate) fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Append a copy of block lane `lane` from `src` columns.
    pub(crate) fn push_lane(&mut self, element: usize, src: &[Column], lane: usize) {
        let index = self.elements.len();
        self.elements.push(element);
        for ((col, src), def) in self.columns.iter_mut().zip(src).zip(self.schema.fields()) {
            let n = def.components as usize;
            col.extend_zeroed(n);
            col.copy_lane(index, src, lane, n);
        }
    }

    /// Append a particle from its little-endian field tuple.
    pub(crate) fn push_encoded(&mut self, element: usize, mut bytes: &[u8]) {
        self.elements.push(element);
        let index = self.elements.len() - 1;
        for (col, def) in self.columns.iter_mut().zip(self.schema.fields()) {
            let n = def.components as usize;
            let (head, rest) = bytes.split_at(def.record_bytes());
            col.extend_zeroed(n);
            col.decode_lane(index, n, head);
            bytes = rest;
        }
    }
}

fn reserve(col: &mut Column, n: usize) {
    match col {
        Column::F64(v) => v.reserve(n),
        Column::F32(v) => v.reserve(n),
        Column::I64(v) => v.reserve(n),
        Column::I32(v) => v.reserve(n),
        Column::U64(v) => v.reserve(n),
        Column::Bool(v) => v.reserve(n),
    }
}

/// Everything needed to construct a container.
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleSnapshot {
    /// Global id of each local element. Its length is the element count.
    pub element_gids: Vec<ElementGid>,
    /// Declared particle count of each element.
    pub particles_per_element: Vec<usize>,
    /// Initial particles; `elements()` are local element indices.
    pub particles: ParticleBatch,
}

impl ParticleSnapshot {
    /// A snapshot whose counts are derived from `particles`.
    pub fn from_batch(element_gids: Vec<ElementGid>, particles: ParticleBatch) -> Self {
        let mut particles_per_element = vec![0; element_gids.len()];
        for &e in particles.elements() {
            if let Some(c) = particles_per_element.get_mut(e) {
                *c += 1;
            }
        }
        Self {
            element_gids,
            particles_per_element,
            particles,
        }
    }

    /// A snapshot with elements but no particles.
    pub fn empty(schema: Schema, element_gids: Vec<ElementGid>) -> Self {
        Self::from_batch(element_gids, ParticleBatch::new(schema))
    }

    /// Number of elements.
    pub fn num_elems(&self) -> usize {
        self.element_gids.len()
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), ConstructionError> {
        let num_elems = self.num_elems();
        if num_elems >= u32::MAX as usize {
            return Err(ConstructionError::InvalidConfig {
                reason: format!("{num_elems} elements exceed the supported maximum"),
            });
        }
        if self.particles_per_element.len() != num_elems {
            return Err(ConstructionError::LengthMismatch {
                what: "particles_per_element",
                expected: num_elems,
                found: self.particles_per_element.len(),
            });
        }

        let mut seen = IndexSet::with_capacity(num_elems);
        for &gid in &self.element_gids {
            if !seen.insert(gid) {
                return Err(ConstructionError::DuplicateElementGid { gid });
            }
        }

        let mut found = vec![0usize; num_elems];
        for (particle, &element) in self.particles.elements().iter().enumerate() {
            if element >= num_elems {
                return Err(ConstructionError::ElementOutOfRange {
                    particle,
                    element,
                    num_elems,
                });
            }
            found[element] += 1;
        }
        for (element, (&declared, &found)) in
            self.particles_per_element.iter().zip(&found).enumerate()
        {
            if declared != found {
                return Err(ConstructionError::CountMismatch {
                    element,
                    declared,
                    found,
                });
            }
        }
        Ok(())
    }
}
