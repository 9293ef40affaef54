//! Type descriptors: how implementation types report their shape to the planner
//!
//! Rust has no runtime reflection, so every implementation type describes itself
//! explicitly: its constructors (parameter names, types, defaults, key
//! annotations), the interfaces it satisfies, and whether it needs disposal.
//! Generic templates additionally declare their parameter constraints and a
//! substitution function that produces the closed descriptor.
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_di::{ConstructorDescriptor, ServiceType, TypeDescriptor};
//!
//! struct Clock;
//! struct Greeter {
//!     clock: Arc<Clock>,
//! }
//!
//! let greeter = TypeDescriptor::of::<Greeter>().constructor(
//!     ConstructorDescriptor::new(|args| Ok(Greeter { clock: args.get::<Clock>(0)? }))
//!         .param("clock", ServiceType::of::<Clock>()),
//! );
//! assert_eq!(greeter.constructors().len(), 1);
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::{DIError, DIResult};
use crate::instance::{Disposal, Instance, ServiceList};
use crate::key::ServiceKey;
use crate::service_type::ServiceType;

/// Kind of a type, used for instantiability and generic constraint checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Struct,
    Interface,
    Abstract,
}

impl TypeKind {
    pub fn is_instantiable(self) -> bool {
        matches!(self, TypeKind::Class | TypeKind::Struct)
    }

    pub fn is_reference(self) -> bool {
        !matches!(self, TypeKind::Struct)
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TypeKind::Class => "a class",
            TypeKind::Struct => "a struct",
            TypeKind::Interface => "an interface",
            TypeKind::Abstract => "abstract",
        };
        f.write_str(text)
    }
}

/// Where a constructor parameter gets its value from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterSource {
    /// Resolve by type, falling back to a registration keyed by the parameter name
    Service,
    /// Resolve a specific keyed registration
    Keyed(ServiceKey),
    /// Receive the key the owning service is being resolved under
    ServiceKey,
}

#[derive(Debug, Clone)]
pub struct ParameterDescriptor {
    name: Arc<str>,
    service_type: ServiceType,
    source: ParameterSource,
    default: Option<Instance>,
}

impl ParameterDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    pub fn source(&self) -> &ParameterSource {
        &self.source
    }

    pub fn default_value(&self) -> Option<&Instance> {
        self.default.as_ref()
    }
}

/// Resolved constructor arguments, in parameter order
pub struct Arguments {
    values: Vec<Instance>,
}

impl Arguments {
    pub(crate) fn new(values: Vec<Instance>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn instance(&self, index: usize) -> DIResult<&Instance> {
        self.values
            .get(index)
            .ok_or_else(|| DIError::InvalidServiceType {
                message: format!("constructor argument {index} is out of range"),
            })
    }

    /// The argument at `index` as a concrete type
    pub fn get<T: Send + Sync + 'static>(&self, index: usize) -> DIResult<Arc<T>> {
        let instance = self.instance(index)?;
        instance
            .downcast::<T>()
            .ok_or_else(|| DIError::InvalidServiceType {
                message: format!(
                    "constructor argument {index} holds '{}', expected '{}'",
                    instance.type_name(),
                    std::any::type_name::<T>()
                ),
            })
    }

    /// The argument at `index` as a sequence of `T`
    pub fn all<T: Send + Sync + 'static>(&self, index: usize) -> DIResult<Vec<Arc<T>>> {
        Ok(self.get::<ServiceList>(index)?.downcast_all::<T>())
    }
}

type Activator = Arc<dyn Fn(&Arguments) -> DIResult<Instance> + Send + Sync>;

/// One public constructor of an implementation type
#[derive(Clone)]
pub struct ConstructorDescriptor {
    parameters: Vec<ParameterDescriptor>,
    activator: Activator,
}

impl ConstructorDescriptor {
    pub fn new<T, F>(activator: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Arguments) -> DIResult<T> + Send + Sync + 'static,
    {
        Self {
            parameters: Vec::new(),
            activator: Arc::new(move |args: &Arguments| activator(args).map(Instance::new)),
        }
    }

    fn push(mut self, name: &str, service_type: ServiceType, source: ParameterSource, default: Option<Instance>) -> Self {
        self.parameters.push(ParameterDescriptor {
            name: name.into(),
            service_type,
            source,
            default,
        });
        self
    }

    pub fn param(self, name: &str, service_type: ServiceType) -> Self {
        self.push(name, service_type, ParameterSource::Service, None)
    }

    pub fn keyed_param(self, name: &str, service_type: ServiceType, key: impl Into<ServiceKey>) -> Self {
        self.push(name, service_type, ParameterSource::Keyed(key.into()), None)
    }

    /// A parameter used when no service satisfies it
    pub fn optional_param(self, name: &str, service_type: ServiceType, default: Instance) -> Self {
        self.push(name, service_type, ParameterSource::Service, Some(default))
    }

    pub fn service_key_param(self, name: &str) -> Self {
        self.push(
            name,
            ServiceType::of::<ServiceKey>(),
            ParameterSource::ServiceKey,
            None,
        )
    }

    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    pub(crate) fn activate(&self, arguments: &Arguments) -> DIResult<Instance> {
        (self.activator)(arguments)
    }

    /// Human-readable signature such as `Foo(ILogger, IClock)`
    pub fn signature(&self, owner: &ServiceType) -> String {
        let params = self
            .parameters
            .iter()
            .map(|p| p.service_type.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        format!("{owner}({params})")
    }
}

impl fmt::Debug for ConstructorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorDescriptor")
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// Shape of a concrete implementation type
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    implementation: ServiceType,
    kind: TypeKind,
    constructors: Vec<Arc<ConstructorDescriptor>>,
    interfaces: Vec<ServiceType>,
    disposal: Option<Disposal>,
}

impl TypeDescriptor {
    pub fn new(implementation: ServiceType) -> Self {
        Self {
            implementation,
            kind: TypeKind::Class,
            constructors: Vec::new(),
            interfaces: Vec::new(),
            disposal: None,
        }
    }

    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::new(ServiceType::of::<T>())
    }

    pub fn kind(mut self, kind: TypeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Declare an interface or base type this implementation is assignable to
    pub fn implements(mut self, service_type: ServiceType) -> Self {
        self.interfaces.push(service_type);
        self
    }

    pub fn constructor(mut self, constructor: ConstructorDescriptor) -> Self {
        self.constructors.push(Arc::new(constructor));
        self
    }

    pub fn disposal(mut self, disposal: Disposal) -> Self {
        self.disposal = Some(disposal);
        self
    }

    pub fn implementation(&self) -> &ServiceType {
        &self.implementation
    }

    pub fn type_kind(&self) -> TypeKind {
        self.kind
    }

    pub fn constructors(&self) -> &[Arc<ConstructorDescriptor>] {
        &self.constructors
    }

    pub fn interfaces(&self) -> &[ServiceType] {
        &self.interfaces
    }

    pub fn is_disposable(&self) -> bool {
        self.disposal.is_some()
    }

    pub(crate) fn disposal_capability(&self) -> Option<&Disposal> {
        self.disposal.as_ref()
    }

    pub fn facts(&self) -> TypeFacts {
        TypeFacts {
            kind: self.kind,
            assignable_to: self.interfaces.clone(),
            default_constructible: self.kind.is_instantiable()
                && (self.kind == TypeKind::Struct
                    || self.constructors.iter().any(|c| c.parameters.is_empty())),
        }
    }
}

/// A constraint on a generic parameter of an open generic implementation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenericConstraint {
    /// `struct`
    ValueType,
    /// `class`
    ReferenceType,
    /// `new()`
    DefaultConstructor,
    /// The argument must implement the given interface
    Implements(ServiceType),
    /// The argument must derive from the given base type
    DerivesFrom(ServiceType),
    /// The argument must implement the given template closed over itself, `T: IComparable<T>`
    SelfReferencing(ServiceType),
}

impl fmt::Display for GenericConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenericConstraint::ValueType => f.write_str("struct"),
            GenericConstraint::ReferenceType => f.write_str("class"),
            GenericConstraint::DefaultConstructor => f.write_str("new()"),
            GenericConstraint::Implements(t) => write!(f, "implements {t}"),
            GenericConstraint::DerivesFrom(t) => write!(f, "derives from {t}"),
            GenericConstraint::SelfReferencing(t) => write!(f, "implements {}<Self>", t.name()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenericParameter {
    pub name: Arc<str>,
    pub constraints: Vec<GenericConstraint>,
}

impl GenericParameter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            constraints: Vec::new(),
        }
    }

    pub fn with(mut self, constraint: GenericConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Reject combinations no argument could ever satisfy
    pub(crate) fn validate(&self, implementation: &ServiceType) -> DIResult<()> {
        let has = |c: &GenericConstraint| self.constraints.contains(c);
        let base_count = self
            .constraints
            .iter()
            .filter(|c| matches!(c, GenericConstraint::DerivesFrom(_)))
            .count();

        let message = if has(&GenericConstraint::ValueType) && has(&GenericConstraint::ReferenceType) {
            Some("'struct' and 'class' cannot be combined")
        } else if has(&GenericConstraint::ValueType) && base_count > 0 {
            Some("'struct' cannot be combined with a base type")
        } else if has(&GenericConstraint::ValueType) && has(&GenericConstraint::DefaultConstructor) {
            Some("'struct' already implies 'new()'")
        } else if base_count > 1 {
            Some("at most one base type may be specified")
        } else {
            None
        };

        match message {
            Some(message) => Err(DIError::InvalidConstraints {
                implementation: implementation.to_string(),
                parameter: self.name.to_string(),
                message: message.to_string(),
            }),
            None => Ok(()),
        }
    }
}

type Substitution = Arc<dyn Fn(&[ServiceType]) -> DIResult<TypeDescriptor> + Send + Sync>;

/// An open generic implementation such as `Repository<T>`
#[derive(Clone)]
pub struct GenericImplementation {
    definition: ServiceType,
    parameters: Vec<GenericParameter>,
    substitute: Substitution,
}

impl GenericImplementation {
    /// `substitute` receives the type arguments and returns the closed descriptor
    pub fn new<F>(name: &str, parameters: Vec<GenericParameter>, substitute: F) -> Self
    where
        F: Fn(&[ServiceType]) -> DIResult<TypeDescriptor> + Send + Sync + 'static,
    {
        Self {
            definition: ServiceType::generic_definition(name, parameters.len()),
            parameters,
            substitute: Arc::new(substitute),
        }
    }

    pub fn definition(&self) -> &ServiceType {
        &self.definition
    }

    pub fn parameters(&self) -> &[GenericParameter] {
        &self.parameters
    }

    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    /// Check every argument against its parameter's constraints
    pub(crate) fn check_constraints(&self, arguments: &[ServiceType], catalog: &TypeCatalog) -> DIResult<()> {
        for (parameter, argument) in self.parameters.iter().zip(arguments) {
            for constraint in &parameter.constraints {
                if !catalog.satisfies(argument, constraint) {
                    return Err(DIError::ConstraintViolation {
                        implementation: self.definition.to_string(),
                        parameter: parameter.name.to_string(),
                        argument: argument.to_string(),
                        constraint: constraint.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub(crate) fn close(&self, arguments: &[ServiceType]) -> DIResult<TypeDescriptor> {
        (self.substitute)(arguments)
    }
}

impl fmt::Debug for GenericImplementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericImplementation")
            .field("definition", &self.definition)
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// What the constraint checker knows about a type
#[derive(Debug, Clone)]
pub struct TypeFacts {
    pub kind: TypeKind,
    pub assignable_to: Vec<ServiceType>,
    pub default_constructible: bool,
}

impl TypeFacts {
    pub fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            assignable_to: Vec::new(),
            default_constructible: kind == TypeKind::Struct,
        }
    }

    pub fn assignable_to(mut self, service_type: ServiceType) -> Self {
        self.assignable_to.push(service_type);
        self
    }

    pub fn default_constructible(mut self, value: bool) -> Self {
        self.default_constructible = value;
        self
    }
}

/// Type facts available to generic constraint checks
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    facts: HashMap<ServiceType, TypeFacts>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn describe(&mut self, service_type: ServiceType, facts: TypeFacts) {
        self.facts.insert(service_type, facts);
    }

    pub fn facts(&self, service_type: &ServiceType) -> Option<&TypeFacts> {
        self.facts.get(service_type)
    }

    /// Whether `from` is `to` or (transitively) declares it as interface/base
    pub fn is_assignable(&self, from: &ServiceType, to: &ServiceType) -> bool {
        let mut seen = HashSet::new();
        let mut pending = vec![from.clone()];
        while let Some(current) = pending.pop() {
            if &current == to {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(facts) = self.facts.get(&current) {
                pending.extend(facts.assignable_to.iter().cloned());
            }
        }
        false
    }

    pub fn satisfies(&self, argument: &ServiceType, constraint: &GenericConstraint) -> bool {
        let facts = self.facts.get(argument);
        match constraint {
            GenericConstraint::ValueType => facts.is_some_and(|f| f.kind == TypeKind::Struct),
            GenericConstraint::ReferenceType => facts.is_some_and(|f| f.kind.is_reference()),
            GenericConstraint::DefaultConstructor => {
                facts.is_some_and(|f| f.kind.is_instantiable() && f.default_constructible)
            }
            GenericConstraint::Implements(target) | GenericConstraint::DerivesFrom(target) => {
                self.is_assignable(argument, target)
            }
            GenericConstraint::SelfReferencing(template) => template
                .make_generic(vec![argument.clone()])
                .is_some_and(|closed| self.is_assignable(argument, &closed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_signature() {
        let ctor = ConstructorDescriptor::new(|_| Ok(()))
            .param("logger", ServiceType::named("ILogger"))
            .param("clock", ServiceType::named("IClock"));
        assert_eq!(
            ctor.signature(&ServiceType::named("Foo")),
            "Foo(ILogger, IClock)"
        );
    }

    #[test]
    fn test_arguments_type_mismatch() {
        let args = Arguments::new(vec![Instance::new(5u32)]);
        assert_eq!(*args.get::<u32>(0).unwrap(), 5);
        assert!(matches!(
            args.get::<String>(0),
            Err(DIError::InvalidServiceType { .. })
        ));
        assert!(args.get::<u32>(3).is_err());
    }

    #[test]
    fn test_invalid_constraint_combinations() {
        let implementation = ServiceType::generic_definition("Box", 1);
        let bad = GenericParameter::new("T")
            .with(GenericConstraint::ValueType)
            .with(GenericConstraint::ReferenceType);
        assert!(matches!(
            bad.validate(&implementation),
            Err(DIError::InvalidConstraints { .. })
        ));

        let good = GenericParameter::new("T")
            .with(GenericConstraint::ReferenceType)
            .with(GenericConstraint::DefaultConstructor);
        assert!(good.validate(&implementation).is_ok());
    }

    #[test]
    fn test_catalog_constraints() {
        let comparable = ServiceType::generic_definition("IComparable", 1);
        let money = ServiceType::named("Money");
        let entity = ServiceType::named("Entity");
        let order = ServiceType::named("Order");

        let mut catalog = TypeCatalog::new();
        catalog.describe(
            money.clone(),
            TypeFacts::new(TypeKind::Struct).assignable_to(
                comparable.make_generic(vec![money.clone()]).unwrap(),
            ),
        );
        catalog.describe(entity.clone(), TypeFacts::new(TypeKind::Abstract));
        catalog.describe(
            order.clone(),
            TypeFacts::new(TypeKind::Class)
                .assignable_to(entity.clone())
                .default_constructible(true),
        );

        assert!(catalog.satisfies(&money, &GenericConstraint::ValueType));
        assert!(!catalog.satisfies(&order, &GenericConstraint::ValueType));
        assert!(catalog.satisfies(&order, &GenericConstraint::ReferenceType));
        assert!(catalog.satisfies(&order, &GenericConstraint::DefaultConstructor));
        assert!(!catalog.satisfies(&entity, &GenericConstraint::DefaultConstructor));
        assert!(catalog.satisfies(&order, &GenericConstraint::DerivesFrom(entity.clone())));
        assert!(catalog.satisfies(
            &money,
            &GenericConstraint::SelfReferencing(comparable.clone())
        ));
        assert!(!catalog.satisfies(&order, &GenericConstraint::SelfReferencing(comparable)));
    }

    #[test]
    fn test_descriptor_facts() {
        let descriptor = TypeDescriptor::new(ServiceType::named("Foo"))
            .implements(ServiceType::named("IFoo"))
            .constructor(ConstructorDescriptor::new(|_| Ok(())));
        let facts = descriptor.facts();
        assert!(facts.default_constructible);
        assert_eq!(facts.assignable_to, vec![ServiceType::named("IFoo")]);
    }
}
