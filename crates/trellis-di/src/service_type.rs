//! Runtime service type identities
//!
//! A [`ServiceType`] names what is being asked for. Rust types map onto it through
//! [`ServiceType::of`], while generic templates ("open generics") and their
//! constructed forms are described explicitly, since the planner needs to reason
//! about type arguments at runtime.

use std::fmt;
use std::sync::Arc;

/// Template name of the built-in "sequence of T" service
pub const SEQUENCE: &str = "Sequence";

#[derive(Debug, PartialEq, Eq, Hash)]
enum Shape {
    Named(Arc<str>),
    Constructed {
        definition: Arc<str>,
        arguments: Vec<ServiceType>,
    },
    Definition {
        name: Arc<str>,
        arity: usize,
    },
}

/// Identity of a service or implementation type
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ServiceType(Arc<Shape>);

impl ServiceType {
    /// A plain, non-generic type
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self(Arc::new(Shape::Named(name.into())))
    }

    /// The type named after a Rust type
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::named(std::any::type_name::<T>())
    }

    /// A generic template such as `IRepository<>` with the given number of parameters
    pub fn generic_definition(name: impl Into<Arc<str>>, arity: usize) -> Self {
        Self(Arc::new(Shape::Definition {
            name: name.into(),
            arity,
        }))
    }

    /// A constructed generic type such as `IRepository<Order>`
    pub fn generic(name: impl Into<Arc<str>>, arguments: Vec<ServiceType>) -> Self {
        Self(Arc::new(Shape::Constructed {
            definition: name.into(),
            arguments,
        }))
    }

    /// The built-in "sequence of T" type used for enumerable resolution
    pub fn sequence_of(item: ServiceType) -> Self {
        Self::generic(SEQUENCE, vec![item])
    }

    /// Base name without type arguments
    pub fn name(&self) -> &str {
        match &*self.0 {
            Shape::Named(name) => name,
            Shape::Constructed { definition, .. } => definition,
            Shape::Definition { name, .. } => name,
        }
    }

    pub fn is_generic_definition(&self) -> bool {
        matches!(&*self.0, Shape::Definition { .. })
    }

    pub fn is_constructed_generic(&self) -> bool {
        matches!(&*self.0, Shape::Constructed { .. })
    }

    /// Number of generic parameters (definitions) or arguments (constructed types)
    pub fn arity(&self) -> usize {
        match &*self.0 {
            Shape::Named(_) => 0,
            Shape::Constructed { arguments, .. } => arguments.len(),
            Shape::Definition { arity, .. } => *arity,
        }
    }

    pub fn generic_arguments(&self) -> &[ServiceType] {
        match &*self.0 {
            Shape::Constructed { arguments, .. } => arguments,
            _ => &[],
        }
    }

    /// The template a constructed generic type was built from
    pub fn generic_definition_of(&self) -> Option<ServiceType> {
        match &*self.0 {
            Shape::Constructed {
                definition,
                arguments,
            } => Some(Self::generic_definition(definition.clone(), arguments.len())),
            _ => None,
        }
    }

    /// Construct this template with concrete arguments
    pub fn make_generic(&self, arguments: Vec<ServiceType>) -> Option<ServiceType> {
        match &*self.0 {
            Shape::Definition { name, arity } if *arity == arguments.len() => {
                Some(Self::generic(name.clone(), arguments))
            }
            _ => None,
        }
    }

    /// Item type when this is a "sequence of T"
    pub fn sequence_item(&self) -> Option<&ServiceType> {
        match &*self.0 {
            Shape::Constructed {
                definition,
                arguments,
            } if &**definition == SEQUENCE && arguments.len() == 1 => arguments.first(),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            Shape::Named(name) => f.write_str(name),
            Shape::Constructed {
                definition,
                arguments,
            } => {
                write!(f, "{definition}<")?;
                for (i, argument) in arguments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{argument}")?;
                }
                f.write_str(">")
            }
            Shape::Definition { name, arity } => {
                write!(f, "{name}<{}>", ",".repeat(arity.saturating_sub(1)))
            }
        }
    }
}

impl fmt::Debug for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceType({self})")
    }
}
