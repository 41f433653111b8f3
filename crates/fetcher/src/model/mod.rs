//! Model casting boundary
//!
//! Linked rows can be shaped by a model type before they are attached. A
//! cast deserializes the raw row into the model and serializes it back, so
//! attached values stay plain JSON while following the model's layout.
//! Derivatives wrap one cast instance, aggregates fold a whole matched
//! sequence into one composite value.

use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::FetchResult;

pub mod file;
pub mod property;
pub(crate) mod serde_util;
pub mod user;

pub use file::File;
pub use property::{PropertyDefinition, PropertyKind};
pub use user::User;

/// A typed model linked rows can be cast into
pub trait LinkedModel: Serialize + DeserializeOwned + 'static {
    fn model_name() -> &'static str {
        type_name::<Self>()
    }
}

/// One-to-one wrapper built over a cast model instance
pub trait Derivative: Serialize + 'static {
    type Base: LinkedModel;

    fn init(base: Self::Base) -> Self;
}

/// Composite built over every model matched for one host record
pub trait Aggregate: Serialize + 'static {
    type Item: LinkedModel;

    fn init(items: Vec<Self::Item>) -> Self;
}

type CastFn = Arc<dyn Fn(Value) -> FetchResult<Value> + Send + Sync>;
type BuildFn = Arc<dyn Fn(Vec<Value>) -> FetchResult<Value> + Send + Sync>;

/// Type-erased handle on a [`LinkedModel`]
#[derive(Clone)]
pub struct ModelType {
    id: TypeId,
    name: &'static str,
    cast: CastFn,
}

impl ModelType {
    pub fn of<M: LinkedModel>() -> Self {
        Self {
            id: TypeId::of::<M>(),
            name: M::model_name(),
            cast: Arc::new(|value: Value| -> FetchResult<Value> {
                let model: M = serde_json::from_value(value)?;
                Ok(serde_json::to_value(model)?)
            }),
        }
    }

    pub fn cast(&self, value: Value) -> FetchResult<Value> {
        (self.cast)(value)
    }

    pub fn cast_all(&self, values: Vec<Value>) -> FetchResult<Vec<Value>> {
        values.into_iter().map(|value| self.cast(value)).collect()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    pub fn is<M: LinkedModel>(&self) -> bool {
        self.id == TypeId::of::<M>()
    }
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModelType({})", self.name)
    }
}

/// Type-erased handle on a [`Derivative`]
#[derive(Clone)]
pub struct DerivativeType {
    base: TypeId,
    name: &'static str,
    wrap: CastFn,
}

impl DerivativeType {
    pub fn of<D: Derivative>() -> Self {
        Self {
            base: TypeId::of::<D::Base>(),
            name: type_name::<D>(),
            wrap: Arc::new(|value: Value| -> FetchResult<Value> {
                let base: D::Base = serde_json::from_value(value)?;
                Ok(serde_json::to_value(D::init(base))?)
            }),
        }
    }

    pub fn wrap(&self, value: Value) -> FetchResult<Value> {
        (self.wrap)(value)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True when this derivative is built over `model`
    pub fn accepts(&self, model: &ModelType) -> bool {
        self.base == model.type_id()
    }
}

impl fmt::Debug for DerivativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DerivativeType({})", self.name)
    }
}

/// Type-erased handle on an [`Aggregate`]
#[derive(Clone)]
pub struct AggregateType {
    item: TypeId,
    name: &'static str,
    build: BuildFn,
}

impl AggregateType {
    pub fn of<A: Aggregate>() -> Self {
        Self {
            item: TypeId::of::<A::Item>(),
            name: type_name::<A>(),
            build: Arc::new(|values: Vec<Value>| -> FetchResult<Value> {
                let items = values
                    .into_iter()
                    .map(serde_json::from_value::<A::Item>)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(serde_json::to_value(A::init(items))?)
            }),
        }
    }

    pub fn build(&self, values: Vec<Value>) -> FetchResult<Value> {
        (self.build)(values)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True when this aggregate folds instances of `model`
    pub fn accepts(&self, model: &ModelType) -> bool {
        self.item == model.type_id()
    }
}

impl fmt::Debug for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AggregateType({})", self.name)
    }
}
