//! Host-declared fields, their scalar members, and placement arguments.
//!
//! A [`Field`] is typed storage declared outside any tree. It consists of
//! one or more [`FieldMember`]s (one per scalar component), each of which
//! must be placed into exactly one tree leaf before it has storage.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::dtype::DataType;
use crate::error::SNodeError;
use crate::id::{FieldMemberId, NodeId, RootId};

/// Shape of a field's member list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberLayout {
    /// One member.
    Scalar,
    /// `n` members.
    Vector {
        /// Number of components.
        n: u32,
    },
    /// `n * m` members in row-major order.
    Matrix {
        /// Rows.
        n: u32,
        /// Columns.
        m: u32,
    },
}

impl MemberLayout {
    /// Number of scalar members.
    pub fn count(self) -> u32 {
        match self {
            Self::Scalar => 1,
            Self::Vector { n } => n,
            Self::Matrix { n, m } => n.saturating_mul(m),
        }
    }

    fn member_name(self, base: &str, k: u32) -> String {
        match self {
            Self::Scalar => base.to_string(),
            Self::Vector { .. } => format!("{base}[{k}]"),
            Self::Matrix { m, .. } => format!("{base}[{}, {}]", k / m, k % m),
        }
    }
}

/// Declaration of a field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDecl {
    /// Name used for place nodes and diagnostics.
    pub name: String,
    /// Element type of every member.
    pub dtype: DataType,
    /// Member shape.
    pub layout: MemberLayout,
    /// Also declare adjoint (gradient) members.
    pub needs_grad: bool,
}

/// Where a member was placed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Placement {
    /// Root handle of the tree holding the place node.
    pub root: RootId,
    /// The place node.
    pub node: NodeId,
}

#[derive(Debug)]
struct MemberInner {
    id: FieldMemberId,
    name: String,
    dtype: DataType,
    primal: bool,
    adjoint: Option<FieldMember>,
    placement: OnceLock<Placement>,
}

/// One scalar storage component of a field.
///
/// Cheap to clone; clones share identity and placement state.
#[derive(Clone, Debug)]
pub struct FieldMember {
    inner: Arc<MemberInner>,
}

impl FieldMember {
    fn new(name: String, dtype: DataType, primal: bool, adjoint: Option<FieldMember>) -> Self {
        Self {
            inner: Arc::new(MemberInner {
                id: FieldMemberId::next(),
                name,
                dtype,
                primal,
                adjoint,
                placement: OnceLock::new(),
            }),
        }
    }

    /// Process-unique member id.
    pub fn id(&self) -> FieldMemberId {
        self.inner.id
    }

    /// Member name, e.g. `v[1]`.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Element type.
    pub fn dtype(&self) -> DataType {
        self.inner.dtype
    }

    /// `false` for adjoint members.
    pub fn is_primal(&self) -> bool {
        self.inner.primal
    }

    /// The gradient member mirroring this one, if declared.
    pub fn adjoint(&self) -> Option<&FieldMember> {
        self.inner.adjoint.as_ref()
    }

    /// Where this member was placed, if it was.
    pub fn placement(&self) -> Option<Placement> {
        self.inner.placement.get().copied()
    }

    /// Whether this member has been placed.
    pub fn is_placed(&self) -> bool {
        self.inner.placement.get().is_some()
    }

    /// Record the placement of this member.
    ///
    /// Succeeds exactly once; later calls return the existing placement.
    pub fn bind(&self, placement: Placement) -> Result<(), Placement> {
        self.inner.placement.set(placement)?;
        Ok(())
    }
}

impl PartialEq for FieldMember {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for FieldMember {}

impl fmt::Display for FieldMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.inner.name, self.inner.dtype)
    }
}

#[derive(Debug)]
struct FieldInner {
    name: String,
    dtype: DataType,
    layout: MemberLayout,
    members: Vec<FieldMember>,
    adjoint: Option<Field>,
}

/// Typed storage declared by the host, placed into a tree by `place`.
///
/// Cheap to clone; clones refer to the same members.
#[derive(Clone, Debug)]
pub struct Field {
    inner: Arc<FieldInner>,
}

impl Field {
    /// Declare a field.
    ///
    /// Fails with [`SNodeError::InvalidArgument`] for an empty member
    /// layout, an invalid quantized type, or gradients on a non-real type.
    pub fn declare(decl: FieldDecl) -> Result<Self, SNodeError> {
        decl.dtype.validate()?;
        let count = decl.layout.count();
        if count == 0 {
            return Err(SNodeError::invalid(format!(
                "field '{}' must have at least one member",
                decl.name
            )));
        }
        if decl.needs_grad && !decl.dtype.is_real() {
            return Err(SNodeError::invalid(format!(
                "field '{}' of type {} cannot have gradients",
                decl.name, decl.dtype
            )));
        }

        let adjoint = decl.needs_grad.then(|| {
            let name = format!("{}.grad", decl.name);
            let members = (0..count)
                .map(|k| FieldMember::new(decl.layout.member_name(&name, k), decl.dtype, false, None))
                .collect();
            Self {
                inner: Arc::new(FieldInner {
                    name,
                    dtype: decl.dtype,
                    layout: decl.layout,
                    members,
                    adjoint: None,
                }),
            }
        });

        let members = (0..count)
            .map(|k| {
                let grad = adjoint
                    .as_ref()
                    .map(|a| a.inner.members[k as usize].clone());
                FieldMember::new(decl.layout.member_name(&decl.name, k), decl.dtype, true, grad)
            })
            .collect();

        Ok(Self {
            inner: Arc::new(FieldInner {
                name: decl.name,
                dtype: decl.dtype,
                layout: decl.layout,
                members,
                adjoint,
            }),
        })
    }

    /// Declare a scalar field.
    pub fn scalar(name: impl Into<String>, dtype: DataType) -> Result<Self, SNodeError> {
        Self::declare(FieldDecl {
            name: name.into(),
            dtype,
            layout: MemberLayout::Scalar,
            needs_grad: false,
        })
    }

    /// Declare an `n`-component vector field.
    pub fn vector(name: impl Into<String>, dtype: DataType, n: u32) -> Result<Self, SNodeError> {
        Self::declare(FieldDecl {
            name: name.into(),
            dtype,
            layout: MemberLayout::Vector { n },
            needs_grad: false,
        })
    }

    /// Declare an `n x m` matrix field.
    pub fn matrix(
        name: impl Into<String>,
        dtype: DataType,
        n: u32,
        m: u32,
    ) -> Result<Self, SNodeError> {
        Self::declare(FieldDecl {
            name: name.into(),
            dtype,
            layout: MemberLayout::Matrix { n, m },
            needs_grad: false,
        })
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Element type.
    pub fn dtype(&self) -> DataType {
        self.inner.dtype
    }

    /// Member shape.
    pub fn layout(&self) -> MemberLayout {
        self.inner.layout
    }

    /// Scalar members in declaration order.
    pub fn members(&self) -> &[FieldMember] {
        &self.inner.members
    }

    /// The gradient field, if declared with gradients.
    pub fn adjoint(&self) -> Option<&Field> {
        self.inner.adjoint.as_ref()
    }

    /// Whether every member has been placed.
    pub fn is_placed(&self) -> bool {
        self.inner.members.iter().all(FieldMember::is_placed)
    }
}

/// Argument to `place`: a field, or a (possibly nested) list of them.
#[derive(Clone, Debug)]
pub enum Place<'a> {
    /// All members of one field.
    Field(&'a Field),
    /// Flattened recursively, in order.
    List(Vec<Place<'a>>),
}

impl Place<'_> {
    /// Members to place, in order, with lists flattened.
    pub fn members(&self) -> Vec<FieldMember> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect(&self, out: &mut Vec<FieldMember>) {
        match self {
            Self::Field(field) => out.extend(field.members().iter().cloned()),
            Self::List(items) => {
                for item in items {
                    item.collect(out);
                }
            }
        }
    }
}

impl<'a> From<&'a Field> for Place<'a> {
    fn from(field: &'a Field) -> Self {
        Self::Field(field)
    }
}

impl<'a> From<Vec<Place<'a>>> for Place<'a> {
    fn from(items: Vec<Place<'a>>) -> Self {
        Self::List(items)
    }
}

impl<'a> From<&'a [Field]> for Place<'a> {
    fn from(fields: &'a [Field]) -> Self {
        Self::List(fields.iter().map(Place::Field).collect())
    }
}
