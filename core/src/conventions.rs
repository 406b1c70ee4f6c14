//! Naming convention for the operations of public types.
//!
//! Every operation is classified from its name alone:
//!
//! * a leading underscore marks it [`Capability::Private`],
//! * a `set_` prefix, a `_mut` suffix or a trailing underscore marks it
//!   [`Capability::Mutating`],
//! * everything else is [`Capability::Pure`].
//!
//! Types declare their operations through [`Surface`], and [`audit`] checks the
//! declared receivers against the classification: mutating operations take
//! `&mut self`, pure operations take `&self` or no receiver at all. The only pure
//! operations allowed to take `&mut self` are the ones that do nothing but fill
//! the result cache (`kernel`).

use std::{collections::HashSet, fmt};

use crate::{
    env::Environment,
    hf::{Rhf, Uhf},
    mp2::Mp2,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    Private,
    Mutating,
    Pure,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::Private => "private",
            Capability::Mutating => "mutating",
            Capability::Pure => "pure",
        })
    }
}

pub fn classify(name: &str) -> Capability {
    if name.starts_with('_') {
        Capability::Private
    } else if name.starts_with("set_") || name.ends_with("_mut") || name.ends_with('_') {
        Capability::Mutating
    } else {
        Capability::Pure
    }
}

/// How an operation takes its object.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Receiver {
    /// `&self`
    Shared,
    /// `&mut self`
    Exclusive,
    /// constructors and other associated functions
    Static,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OperationSpec {
    pub name: &'static str,
    pub receiver: Receiver,
    /// The operation mutates nothing but the result cache.
    pub caches_result: bool,
}

impl OperationSpec {
    pub const fn shared(name: &'static str) -> Self {
        Self {
            name,
            receiver: Receiver::Shared,
            caches_result: false,
        }
    }

    pub const fn exclusive(name: &'static str) -> Self {
        Self {
            name,
            receiver: Receiver::Exclusive,
            caches_result: false,
        }
    }

    pub const fn constructor(name: &'static str) -> Self {
        Self {
            name,
            receiver: Receiver::Static,
            caches_result: false,
        }
    }

    /// An entry operation: takes `&mut self` to fill the result cache only.
    pub const fn entry(name: &'static str) -> Self {
        Self {
            name,
            receiver: Receiver::Exclusive,
            caches_result: true,
        }
    }

    pub fn capability(&self) -> Capability {
        classify(self.name)
    }
}

/// The public operations of a type.
pub trait Surface {
    const TYPE_NAME: &'static str;
    /// Operations implemented on the type itself.
    const INHERENT: &'static [OperationSpec];
    /// Operations the type gets through the method-layer traits it implements.
    const TRAITS: &'static [&'static [OperationSpec]];

    fn operations() -> Vec<OperationSpec> {
        let mut operations = Self::INHERENT.to_vec();
        for provided in Self::TRAITS {
            operations.extend_from_slice(provided);
        }
        operations
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    /// The same name is declared more than once.
    Duplicate,
    /// A private name is part of the public surface.
    PrivateExposed,
    /// A mutating name that does not take `&mut self`.
    MutatingWithoutExclusiveAccess,
    /// A pure name that takes `&mut self` for more than result caching.
    PureWithExclusiveAccess,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub type_name: &'static str,
    pub operation: &'static str,
    pub kind: ViolationKind,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self.kind {
            ViolationKind::Duplicate => "is declared more than once",
            ViolationKind::PrivateExposed => "is private by name but publicly exposed",
            ViolationKind::MutatingWithoutExclusiveAccess => {
                "is mutating by name but does not take `&mut self`"
            }
            ViolationKind::PureWithExclusiveAccess => {
                "is pure by name but takes `&mut self` for more than caching its result"
            }
        };
        write!(f, "{}::{} {reason}", self.type_name, self.operation)
    }
}

fn check(operation: &OperationSpec) -> Option<ViolationKind> {
    match (operation.capability(), operation.receiver) {
        (Capability::Private, _) => Some(ViolationKind::PrivateExposed),
        (Capability::Mutating, Receiver::Exclusive) => None,
        (Capability::Mutating, _) => Some(ViolationKind::MutatingWithoutExclusiveAccess),
        (Capability::Pure, Receiver::Exclusive) if !operation.caches_result => {
            Some(ViolationKind::PureWithExclusiveAccess)
        }
        (Capability::Pure, _) => None,
    }
}

/// Checks a declared surface against the naming convention.
pub fn audit_operations(type_name: &'static str, operations: &[OperationSpec]) -> Vec<Violation> {
    let mut seen = HashSet::new();
    let mut violations = Vec::new();

    for operation in operations {
        if !seen.insert(operation.name) {
            violations.push(Violation {
                type_name,
                operation: operation.name,
                kind: ViolationKind::Duplicate,
            });
        }
        if let Some(kind) = check(operation) {
            violations.push(Violation {
                type_name,
                operation: operation.name,
                kind,
            });
        }
    }
    violations
}

pub fn audit<T: Surface>() -> Vec<Violation> {
    audit_operations(T::TYPE_NAME, &T::operations())
}

/// Name, operations and violations of every public method-layer type.
pub fn surfaces() -> Vec<(&'static str, Vec<OperationSpec>, Vec<Violation>)> {
    fn entry<T: Surface>() -> (&'static str, Vec<OperationSpec>, Vec<Violation>) {
        (T::TYPE_NAME, T::operations(), audit::<T>())
    }

    vec![
        entry::<Environment>(),
        entry::<Rhf>(),
        entry::<Uhf>(),
        entry::<Mp2>(),
    ]
}

use self::OperationSpec as Op;

/// Operations of [`Handler`](crate::method::Handler).
pub const HANDLER: &[OperationSpec] = &[
    Op::shared("system"),
    Op::shared("defaults"),
    Op::shared("kind"),
    Op::shared("restricted_reference"),
];

/// Operations of [`Overrides`](crate::method::Overrides).
pub const OVERRIDES: &[OperationSpec] = &[
    Op::shared("local_defaults"),
    Op::exclusive("local_defaults_mut"),
    Op::shared("verbosity"),
    Op::exclusive("set_verbosity"),
    Op::shared("output"),
    Op::exclusive("set_output"),
    Op::shared("max_memory"),
    Op::exclusive("set_max_memory"),
];

/// Operations of [`Method`](crate::method::Method).
pub const METHOD: &[OperationSpec] = &[
    Op::entry("kernel"),
    Op::shared("result"),
    Op::shared("state"),
];

impl Surface for Environment {
    const TYPE_NAME: &'static str = "Environment";
    const INHERENT: &'static [OperationSpec] = &[
        Op::constructor("new"),
        Op::constructor("from_shared"),
        Op::constructor("load"),
        Op::shared("verbosity"),
        Op::exclusive("set_verbosity"),
        Op::shared("output"),
        Op::exclusive("set_output"),
        Op::shared("max_memory"),
        Op::exclusive("set_max_memory"),
        Op::shared("logger"),
    ];
    const TRAITS: &'static [&'static [OperationSpec]] = &[HANDLER];
}

impl Surface for Rhf {
    const TYPE_NAME: &'static str = "Rhf";
    const INHERENT: &'static [OperationSpec] = &[
        Op::constructor("new"),
        Op::shared("size"),
        Op::shared("controls"),
        Op::shared("occupation"),
        Op::exclusive("set_controls"),
        Op::exclusive("set_conv_tol"),
        Op::exclusive("set_max_cycle"),
        Op::exclusive("set_diis_space"),
        Op::exclusive("set_damp"),
        Op::exclusive("set_occupation"),
        Op::entry("kernel_with"),
        Op::shared("make_rdm1"),
        Op::shared("energy_elec"),
        Op::shared("energy_tot"),
        Op::shared("homo_lumo"),
        Op::shared("mulliken_pop"),
        Op::shared("analyze"),
        Op::shared("dump_flags"),
    ];
    const TRAITS: &'static [&'static [OperationSpec]] = &[HANDLER, OVERRIDES, METHOD];
}

impl Surface for Uhf {
    const TYPE_NAME: &'static str = "Uhf";
    const INHERENT: &'static [OperationSpec] = &[
        Op::constructor("new"),
        Op::shared("size"),
        Op::shared("controls"),
        Op::exclusive("set_controls"),
        Op::exclusive("set_conv_tol"),
        Op::exclusive("set_max_cycle"),
        Op::exclusive("set_diis_space"),
        Op::exclusive("set_damp"),
        Op::entry("kernel_with"),
        Op::shared("make_rdm1"),
        Op::shared("energy_elec"),
        Op::shared("energy_tot"),
        Op::shared("spin_square"),
        Op::shared("mulliken_pop"),
        Op::shared("analyze"),
        Op::shared("dump_flags"),
    ];
    const TRAITS: &'static [&'static [OperationSpec]] = &[HANDLER, OVERRIDES, METHOD];
}

impl Surface for Mp2 {
    const TYPE_NAME: &'static str = "Mp2";
    const INHERENT: &'static [OperationSpec] = &[
        Op::constructor("new"),
        Op::constructor("with_reference"),
        Op::shared("size"),
        Op::shared("reference"),
        Op::shared("frozen"),
        Op::exclusive("set_frozen"),
        Op::entry("kernel_with"),
        Op::shared("dump_flags"),
    ];
    const TRAITS: &'static [&'static [OperationSpec]] = &[HANDLER, OVERRIDES, METHOD];
}
