// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process metadata for types hosting tests, and the registry they are discovered from.
//!
//! Metadata is inert data: a [`TypeInfo`] describes a type (visibility, kind, constructor) and its
//! methods, and a [`MethodInfo`] describes one method (signature shape, attributes and a
//! type-erased body). Types are registered explicitly in a [`TestRegistry`]. The typed
//! [`SuiteBuilder`] is the usual way to produce well-formed metadata; the raw builders on
//! [`TypeInfo`] and [`MethodInfo`] can describe arbitrary shapes, including ones the inspector
//! rejects.

use crate::{
    fixture::{Fixture, TestContext, TestResult, TestSignal},
    helpers::split_type_name,
};
use debug_ignore::DebugIgnore;
use smol_str::SmolStr;
use std::{any::Any, error, fmt, marker::PhantomData, sync::Arc};
use unitrun_metadata::ErrorInfo;

/// Visibility of a type, method or constructor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Visibility {
    /// Visible everywhere.
    Public,
    /// Visible within the declaring module or assembly.
    Internal,
    /// Visible within the declaring type.
    Private,
}

/// The kind of a type.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TypeKind {
    /// A reference type with a constructor.
    Class,
    /// A value type.
    Struct,
    /// An interface.
    Interface,
}

/// The declared return type of a method.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReturnKind {
    /// The method returns nothing.
    Unit,
    /// The method returns a value of the named type.
    Value(SmolStr),
}

/// A declared method parameter.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParamKind {
    /// The method receives the [`TestContext`].
    Context,
    /// Any other parameter, with its type name.
    Other(SmolStr),
}

/// A metadata attribute attached to a method.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Attribute {
    /// Marks the method as a test.
    Test,
    /// A human-readable description.
    Description(String),
    /// A group tag used for filtering.
    Group(SmolStr),
    /// The test must not be run, with an optional reason.
    Skip(Option<String>),
    /// The method runs before every test of its type.
    PreTestAction,
    /// The method runs after every test of its type.
    PostTestAction,
}

pub(crate) type MethodBody =
    Arc<dyn Fn(&mut dyn Fixture, &mut TestContext) -> TestResult + Send + Sync>;

pub(crate) type FixtureFactory = Arc<dyn Fn() -> Result<Box<dyn Fixture>, ErrorInfo> + Send + Sync>;

/// Metadata for a single method.
#[derive(Clone, Debug)]
pub struct MethodInfo {
    name: SmolStr,
    visibility: Visibility,
    is_static: bool,
    is_abstract: bool,
    is_generic: bool,
    return_kind: ReturnKind,
    params: Vec<ParamKind>,
    attributes: Vec<Attribute>,
    body: Option<DebugIgnore<MethodBody>>,
}

impl MethodInfo {
    /// Creates metadata for a public, unit-returning, parameterless method without a body or
    /// attributes.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            visibility: Visibility::Public,
            is_static: false,
            is_abstract: false,
            is_generic: false,
            return_kind: ReturnKind::Unit,
            params: Vec::new(),
            attributes: Vec::new(),
            body: None,
        }
    }

    /// Creates metadata for a method with a body operating on fixtures of type `T`.
    ///
    /// The method declares a single [`ParamKind::Context`] parameter.
    pub fn with_body<T, F>(name: impl Into<SmolStr>, body: F) -> Self
    where
        T: Fixture,
        F: Fn(&mut T, &mut TestContext) -> TestResult + Send + Sync + 'static,
    {
        let mut method = Self::new(name);
        method.params.push(ParamKind::Context);
        method.body = Some(DebugIgnore(erase_body(body)));
        method
    }

    /// Sets the visibility.
    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Marks the method static.
    pub fn static_method(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Marks the method abstract.
    pub fn abstract_method(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Marks the method generic.
    pub fn generic(mut self) -> Self {
        self.is_generic = true;
        self
    }

    /// Declares a return type.
    pub fn returns(mut self, type_name: impl Into<SmolStr>) -> Self {
        self.return_kind = ReturnKind::Value(type_name.into());
        self
    }

    /// Appends a declared parameter.
    pub fn param(mut self, param: ParamKind) -> Self {
        self.params.push(param);
        self
    }

    /// Appends an attribute.
    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Appends [`Attribute::Test`].
    pub fn test(self) -> Self {
        self.attribute(Attribute::Test)
    }

    /// Appends [`Attribute::Group`].
    pub fn group(self, group: impl Into<SmolStr>) -> Self {
        self.attribute(Attribute::Group(group.into()))
    }

    /// Appends [`Attribute::Description`].
    pub fn description(self, description: impl Into<String>) -> Self {
        self.attribute(Attribute::Description(description.into()))
    }

    /// Appends [`Attribute::Skip`] with an optional reason.
    pub fn skip(self, reason: Option<&str>) -> Self {
        self.attribute(Attribute::Skip(reason.map(str::to_owned)))
    }

    /// The method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The method visibility.
    pub fn get_visibility(&self) -> Visibility {
        self.visibility
    }

    /// Whether the method is static.
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Whether the method is abstract.
    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// Whether the method is generic.
    pub fn is_generic(&self) -> bool {
        self.is_generic
    }

    /// The declared return type.
    pub fn return_kind(&self) -> &ReturnKind {
        &self.return_kind
    }

    /// The declared parameters.
    pub fn params(&self) -> &[ParamKind] {
        &self.params
    }

    /// The attributes, in declaration order.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Returns true if the method carries the given marker attribute.
    pub fn has_attribute(&self, attribute: &Attribute) -> bool {
        self.attributes.contains(attribute)
    }

    /// Returns true if the method is a pre- or post-test action.
    pub fn is_test_action(&self) -> bool {
        self.attributes
            .iter()
            .any(|a| matches!(a, Attribute::PreTestAction | Attribute::PostTestAction))
    }

    pub(crate) fn body(&self) -> Option<&MethodBody> {
        self.body.as_deref()
    }
}

fn erase_body<T, F>(body: F) -> MethodBody
where
    T: Fixture,
    F: Fn(&mut T, &mut TestContext) -> TestResult + Send + Sync + 'static,
{
    Arc::new(move |fixture: &mut dyn Fixture, cx: &mut TestContext| {
        let fixture: &mut dyn Any = fixture;
        match fixture.downcast_mut::<T>() {
            Some(fixture) => body(fixture, cx),
            None => Err(TestSignal::Error(ErrorInfo::new(
                "unitrun::FixtureMismatch",
                format!(
                    "method body expects a fixture of type `{}`",
                    std::any::type_name::<T>()
                ),
            ))),
        }
    })
}

/// The constructor of a type.
#[derive(Clone, Debug)]
pub struct Constructor {
    visibility: Visibility,
    param_count: usize,
    factory: DebugIgnore<FixtureFactory>,
}

impl Constructor {
    /// Creates a public parameterless constructor from a fallible factory.
    pub fn new<T, E, F>(factory: F) -> Self
    where
        T: Fixture,
        E: error::Error,
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
    {
        let factory: FixtureFactory = Arc::new(move || match factory() {
            Ok(fixture) => Ok(Box::new(fixture) as Box<dyn Fixture>),
            Err(error) => Err(ErrorInfo::from_error(&error)),
        });
        Self {
            visibility: Visibility::Public,
            param_count: 0,
            factory: DebugIgnore(factory),
        }
    }

    /// Sets the visibility.
    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Declares the number of constructor parameters.
    pub fn param_count(mut self, count: usize) -> Self {
        self.param_count = count;
        self
    }

    /// Returns true if this is a public constructor without parameters.
    pub fn is_public_parameterless(&self) -> bool {
        self.visibility == Visibility::Public && self.param_count == 0
    }

    pub(crate) fn factory(&self) -> &FixtureFactory {
        &self.factory
    }
}

/// Metadata for a type hosting tests.
#[derive(Clone, Debug)]
pub struct TypeInfo {
    namespace: SmolStr,
    name: SmolStr,
    visibility: Visibility,
    kind: TypeKind,
    is_abstract: bool,
    is_generic: bool,
    constructor: Option<Constructor>,
    methods: Vec<MethodInfo>,
}

impl TypeInfo {
    /// Creates metadata for a public, concrete class named `full_name` (`namespace.Name`), with no
    /// constructor and no methods.
    pub fn new(full_name: &str) -> Self {
        let (namespace, name) = split_type_name(full_name);
        Self {
            namespace: namespace.into(),
            name: name.into(),
            visibility: Visibility::Public,
            kind: TypeKind::Class,
            is_abstract: false,
            is_generic: false,
            constructor: None,
            methods: Vec::new(),
        }
    }

    /// Sets the visibility.
    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Sets the kind.
    pub fn kind(mut self, kind: TypeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Marks the type abstract.
    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Marks the type generic.
    pub fn generic(mut self) -> Self {
        self.is_generic = true;
        self
    }

    /// Sets the constructor.
    pub fn constructor(mut self, constructor: Constructor) -> Self {
        self.constructor = Some(constructor);
        self
    }

    /// Appends a method.
    pub fn method(mut self, method: MethodInfo) -> Self {
        self.methods.push(method);
        self
    }

    /// Finishes building, returning a shared handle.
    pub fn build(self) -> Arc<TypeInfo> {
        Arc::new(self)
    }

    /// The namespace, possibly empty.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The type name without its namespace.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fully-qualified type name.
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.to_string()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// The type visibility.
    pub fn get_visibility(&self) -> Visibility {
        self.visibility
    }

    /// The type kind.
    pub fn get_kind(&self) -> TypeKind {
        self.kind
    }

    /// Whether the type is abstract.
    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// Whether the type is generic.
    pub fn is_generic(&self) -> bool {
        self.is_generic
    }

    /// The constructor, if any.
    pub fn get_constructor(&self) -> Option<&Constructor> {
        self.constructor.as_ref()
    }

    /// The methods, in declaration order.
    pub fn methods(&self) -> &[MethodInfo] {
        &self.methods
    }
}

/// A cheap handle to a method of a registered type.
#[derive(Clone)]
pub struct MethodRef {
    ty: Arc<TypeInfo>,
    index: usize,
}

impl MethodRef {
    /// Returns a handle to the method `name` of `ty`, if it exists.
    ///
    /// If several methods share the name, the first one is returned.
    pub fn new(ty: &Arc<TypeInfo>, name: &str) -> Option<Self> {
        let index = ty.methods.iter().position(|m| m.name == name)?;
        Some(Self {
            ty: ty.clone(),
            index,
        })
    }

    pub(crate) fn from_index(ty: &Arc<TypeInfo>, index: usize) -> Self {
        Self {
            ty: ty.clone(),
            index,
        }
    }

    /// Returns handles to every method of `ty` carrying [`Attribute::Test`].
    pub fn tests_of(ty: &Arc<TypeInfo>) -> impl Iterator<Item = MethodRef> + '_ {
        ty.methods
            .iter()
            .enumerate()
            .filter(|(_, m)| m.has_attribute(&Attribute::Test))
            .map(|(index, _)| MethodRef {
                ty: ty.clone(),
                index,
            })
    }

    /// The declaring type.
    pub fn declaring_type(&self) -> &Arc<TypeInfo> {
        &self.ty
    }

    /// The method metadata.
    pub fn method(&self) -> &MethodInfo {
        &self.ty.methods[self.index]
    }

    /// Returns true if both handles point to a method of the same declaring type.
    pub fn same_type(&self, other: &MethodRef) -> bool {
        Arc::ptr_eq(&self.ty, &other.ty)
    }
}

impl fmt::Debug for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodRef({}.{})", self.ty.full_name(), self.method().name)
    }
}

/// The set of types known to the process.
#[derive(Clone, Debug, Default)]
pub struct TestRegistry {
    types: Vec<Arc<TypeInfo>>,
}

impl TestRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type.
    pub fn register(&mut self, ty: Arc<TypeInfo>) -> &mut Self {
        self.types.push(ty);
        self
    }

    /// The registered types, in registration order.
    pub fn types(&self) -> &[Arc<TypeInfo>] {
        &self.types
    }

    /// Returns every candidate test method: methods carrying [`Attribute::Test`], by type in
    /// registration order and by declaration order within a type.
    pub fn candidates(&self) -> Vec<MethodRef> {
        self.types
            .iter()
            .flat_map(|ty| MethodRef::tests_of(ty))
            .collect()
    }

    /// Finds a type by fully-qualified name.
    pub fn find_type(&self, full_name: &str) -> Option<&Arc<TypeInfo>> {
        self.types.iter().find(|ty| ty.full_name() == full_name)
    }
}

/// Builds well-formed metadata for a fixture type `T`.
///
/// ```
/// use unitrun_runner::{fixture::Fixture, registry::SuiteBuilder};
///
/// #[derive(Default)]
/// struct MathTests {
///     base: i32,
/// }
///
/// impl Fixture for MathTests {}
///
/// let ty = SuiteBuilder::<MathTests>::new("app.MathTests")
///     .default_constructor()
///     .test("adds", |fx, cx| cx.check(fx.base + 2 == 2, "0 + 2 == 2"))
///     .build();
/// assert_eq!(ty.full_name(), "app.MathTests");
/// ```
pub struct SuiteBuilder<T> {
    info: TypeInfo,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Fixture> SuiteBuilder<T> {
    /// Starts a suite for a public class named `full_name`.
    pub fn new(full_name: &str) -> Self {
        Self {
            info: TypeInfo::new(full_name),
            _marker: PhantomData,
        }
    }

    /// Uses `T::default` as the constructor.
    pub fn default_constructor(self) -> Self
    where
        T: Default,
    {
        self.constructor(T::default)
    }

    /// Uses an infallible factory as the constructor. Panics in the factory are captured.
    pub fn constructor<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let factory: FixtureFactory = Arc::new(move || Ok(Box::new(factory()) as Box<dyn Fixture>));
        self.info.constructor = Some(Constructor {
            visibility: Visibility::Public,
            param_count: 0,
            factory: DebugIgnore(factory),
        });
        self
    }

    /// Uses a fallible factory as the constructor.
    pub fn try_constructor<E, F>(mut self, factory: F) -> Self
    where
        E: error::Error,
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
    {
        self.info.constructor = Some(Constructor::new(factory));
        self
    }

    /// Adds a test method.
    pub fn test<F>(self, name: &str, body: F) -> Self
    where
        F: Fn(&mut T, &mut TestContext) -> TestResult + Send + Sync + 'static,
    {
        self.test_with(name, body, |m| m)
    }

    /// Adds a test method, letting `configure` attach further attributes.
    pub fn test_with<F, C>(mut self, name: &str, body: F, configure: C) -> Self
    where
        F: Fn(&mut T, &mut TestContext) -> TestResult + Send + Sync + 'static,
        C: FnOnce(MethodInfo) -> MethodInfo,
    {
        let method = configure(MethodInfo::with_body(name, body).test());
        self.info.methods.push(method);
        self
    }

    /// Adds a pre-test action.
    pub fn pre_test_action<F>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(&mut T, &mut TestContext) -> TestResult + Send + Sync + 'static,
    {
        let method = MethodInfo::with_body(name, body).attribute(Attribute::PreTestAction);
        self.info.methods.push(method);
        self
    }

    /// Adds a post-test action.
    pub fn post_test_action<F>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(&mut T, &mut TestContext) -> TestResult + Send + Sync + 'static,
    {
        let method = MethodInfo::with_body(name, body).attribute(Attribute::PostTestAction);
        self.info.methods.push(method);
        self
    }

    /// Adds arbitrary method metadata.
    pub fn method(mut self, method: MethodInfo) -> Self {
        self.info.methods.push(method);
        self
    }

    /// Finishes building, returning a shared handle.
    pub fn build(self) -> Arc<TypeInfo> {
        Arc::new(self.info)
    }
}
