// SPDX-License-Identifier: MIT OR Apache-2.0
//! Serialization plans and the process-wide plan cache.
//!
//! A [`Plan`] is the ordered list of field steps for one message type. It is
//! derived once from the type's [`WireMessage::describe`] schema, validated,
//! and published into a cache keyed by `TypeId`. Concurrent first use may
//! build the same plan twice; whichever copy is published first wins and the
//! other is dropped.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use bridge_buffer::ByteBuffer;
use tracing::{debug, error};

use crate::{Decoder, PlanError, WireError};

/// Encoder for one field of `T`.
pub type EncodeFn<T> = fn(&T, &mut ByteBuffer) -> Result<(), WireError>;

/// Decoder for one field of `T`, writing into a default-initialised value.
pub type DecodeFn<T> = fn(&mut T, &mut Decoder<'_>) -> Result<(), WireError>;

// ---------------------------------------------------------------------------
// WireMessage
// ---------------------------------------------------------------------------

/// A type whose wire layout is a list of ordered fields.
///
/// Implementations are normally generated by [`wire_message!`](crate::wire_message).
pub trait WireMessage: Default + Send + Sync + 'static {
    /// Type name used in diagnostics.
    const NAME: &'static str;

    /// List the fields and their order values.
    fn describe(plan: &mut PlanBuilder<Self>);

    /// The cached plan for this type.
    fn plan() -> Result<Arc<Plan<Self>>, PlanError> {
        plan_for::<Self>()
    }

    /// Append every field in plan order.
    fn encode_fields(&self, buf: &mut ByteBuffer) -> Result<(), WireError> {
        Self::plan()?.encode(self, buf)
    }

    /// Decode every field in plan order into a fresh value.
    fn decode_fields(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        let plan = Self::plan()?;
        let mut value = Self::default();
        plan.decode_into(&mut value, dec)?;
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

struct Step<T> {
    name: &'static str,
    order: Option<i32>,
    encode: EncodeFn<T>,
    decode: DecodeFn<T>,
}

/// Validated, ordered field steps for one message type.
pub struct Plan<T> {
    type_name: &'static str,
    steps: Vec<Step<T>>,
}

impl<T> Plan<T> {
    /// Message type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Number of wire fields.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// `true` for a type with no wire fields.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Field names in wire order.
    pub fn field_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name).collect()
    }

    /// Append every field of `value`.
    pub fn encode(&self, value: &T, buf: &mut ByteBuffer) -> Result<(), WireError> {
        for step in &self.steps {
            (step.encode)(value, buf)?;
        }
        Ok(())
    }

    /// Decode every field into `value`.
    pub fn decode_into(&self, value: &mut T, dec: &mut Decoder<'_>) -> Result<(), WireError> {
        for step in &self.steps {
            (step.decode)(value, dec)?;
        }
        Ok(())
    }
}

impl<T> fmt::Debug for Plan<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("type_name", &self.type_name)
            .field(
                "fields",
                &self
                    .steps
                    .iter()
                    .map(|s| (s.name, s.order))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

// ---------------------------------------------------------------------------
// PlanBuilder
// ---------------------------------------------------------------------------

/// Collects field steps for [`WireMessage::describe`].
pub struct PlanBuilder<T> {
    type_name: &'static str,
    ordered: Vec<Step<T>>,
    trailing: Vec<Step<T>>,
}

impl<T> PlanBuilder<T> {
    /// Start an empty schema for `type_name`.
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            ordered: Vec::new(),
            trailing: Vec::new(),
        }
    }

    /// Declare a field at position `order`. Fields are sorted ascending.
    pub fn field(
        &mut self,
        name: &'static str,
        order: i32,
        encode: EncodeFn<T>,
        decode: DecodeFn<T>,
    ) -> &mut Self {
        self.ordered.push(Step {
            name,
            order: Some(order),
            encode,
            decode,
        });
        self
    }

    /// Declare a field that follows every ordered field, whatever their
    /// order values. Trailing fields keep their declaration order.
    pub fn trailing(
        &mut self,
        name: &'static str,
        encode: EncodeFn<T>,
        decode: DecodeFn<T>,
    ) -> &mut Self {
        self.trailing.push(Step {
            name,
            order: None,
            encode,
            decode,
        });
        self
    }

    /// Sort and validate.
    pub fn build(self) -> Result<Plan<T>, PlanError> {
        let PlanBuilder {
            type_name,
            mut ordered,
            trailing,
        } = self;
        ordered.sort_by_key(|s| s.order);

        for pair in ordered.windows(2) {
            if pair[0].order == pair[1].order {
                return Err(PlanError::DuplicateOrder {
                    type_name,
                    order: pair[0].order.unwrap_or_default(),
                    first: pair[0].name,
                    second: pair[1].name,
                });
            }
        }

        let mut steps = ordered;
        steps.extend(trailing);
        for (i, step) in steps.iter().enumerate() {
            if steps[..i].iter().any(|s| s.name == step.name) {
                return Err(PlanError::DuplicateField {
                    type_name,
                    field: step.name,
                });
            }
        }

        Ok(Plan { type_name, steps })
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

type CacheEntry = Arc<dyn Any + Send + Sync>;

fn cache() -> &'static RwLock<HashMap<TypeId, CacheEntry>> {
    static CACHE: OnceLock<RwLock<HashMap<TypeId, CacheEntry>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

fn lookup<T: WireMessage>(entry: &CacheEntry) -> Option<Result<Arc<Plan<T>>, PlanError>> {
    entry
        .downcast_ref::<Result<Arc<Plan<T>>, PlanError>>()
        .cloned()
}

/// Build `T`'s plan from its schema without consulting the cache.
pub fn build_plan<T: WireMessage>() -> Result<Plan<T>, PlanError> {
    let mut builder = PlanBuilder::new(T::NAME);
    T::describe(&mut builder);
    builder.build()
}

/// Fetch `T`'s plan, building and publishing it on first use.
///
/// A failed build is cached too: the type stays unusable for the life of
/// the process.
pub fn plan_for<T: WireMessage>() -> Result<Arc<Plan<T>>, PlanError> {
    let key = TypeId::of::<T>();
    {
        let map = cache().read().unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = map.get(&key).and_then(lookup::<T>) {
            return hit;
        }
    }

    let built = build_plan::<T>().map(Arc::new);
    match &built {
        Ok(plan) => debug!(target: "bridge.wire", message_type = T::NAME, fields = plan.len(), "built serialization plan"),
        Err(e) => error!(target: "bridge.wire", message_type = T::NAME, error = %e, "invalid message schema"),
    }

    let mut map = cache().write().unwrap_or_else(PoisonError::into_inner);
    let entry = map
        .entry(key)
        .or_insert_with(|| Arc::new(built.clone()) as CacheEntry);
    lookup::<T>(entry).unwrap_or(built)
}
