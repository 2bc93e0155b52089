//! Deferred side effects of attribute writes.
//!
//! A store never runs a field's effect itself. It packages the transition as a
//! [`DeferredEffect`] and hands it to the owning entity's [`EffectSink`]; the
//! entity applies it on its own execution context, in arrival order.

use crate::schema::EffectFn;
use crate::value::MetaValue;
use entsync_core::EntityBody;
use std::fmt;
use std::sync::Arc;

/// A committed transition waiting to be applied to the entity body.
#[derive(Clone)]
pub struct DeferredEffect {
    index: u8,
    old: MetaValue,
    new: MetaValue,
    effect: EffectFn,
}

impl DeferredEffect {
    /// Package a transition of `index` from `old` to `new`.
    pub fn new(index: u8, old: MetaValue, new: MetaValue, effect: EffectFn) -> Self {
        Self {
            index,
            old,
            new,
            effect,
        }
    }

    /// Index whose write produced this effect.
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Value before the write.
    pub fn old(&self) -> &MetaValue {
        &self.old
    }

    /// Value after the write.
    pub fn new_value(&self) -> &MetaValue {
        &self.new
    }

    /// Run the effect against `body`.
    pub fn apply(self, body: &mut EntityBody) {
        (self.effect)(&self.old, &self.new, body);
    }
}

impl fmt::Debug for DeferredEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredEffect")
            .field("index", &self.index)
            .field("old", &self.old)
            .field("new", &self.new)
            .finish()
    }
}

/// Destination for deferred effects, typically an entity inbox.
///
/// `defer` must not block: it enqueues and returns.
pub trait EffectSink: Send + Sync {
    /// Enqueue an effect for the owning entity.
    fn defer(&self, effect: DeferredEffect);
}

/// Connects a store to the inbox of the entity that owns it.
#[derive(Clone)]
pub struct SideEffectBinder {
    sink: Arc<dyn EffectSink>,
}

impl SideEffectBinder {
    /// Bind to `sink`.
    pub fn new(sink: impl EffectSink + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    /// Hand `effect` off to the owning entity.
    pub fn schedule(&self, effect: DeferredEffect) {
        tracing::trace!(index = effect.index, "deferring attribute side effect");
        self.sink.defer(effect);
    }
}

impl fmt::Debug for SideEffectBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SideEffectBinder").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entsync_core::BoundingBox;
    use std::sync::Mutex;

    fn body() -> EntityBody {
        EntityBody::new(Default::default(), BoundingBox::new(1.0, 2.0, 1.0))
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<DeferredEffect>>);

    impl EffectSink for Arc<Recorder> {
        fn defer(&self, effect: DeferredEffect) {
            self.0.lock().unwrap().push(effect);
        }
    }

    fn grow(_old: &MetaValue, new: &MetaValue, body: &mut EntityBody) {
        if let MetaValue::Boolean(true) = new {
            body.bounding_box = body.bounding_box.scaled(2.0);
        }
    }

    #[test]
    fn schedule_hands_off_without_running() {
        let recorder = Arc::new(Recorder::default());
        let binder = SideEffectBinder::new(recorder.clone());
        binder.schedule(DeferredEffect::new(
            3,
            MetaValue::Boolean(false),
            MetaValue::Boolean(true),
            grow,
        ));

        let mut queued = recorder.0.lock().unwrap().drain(..).collect::<Vec<_>>();
        assert_eq!(queued.len(), 1);
        let effect = queued.remove(0);
        assert_eq!(effect.index(), 3);

        let mut body = body();
        effect.apply(&mut body);
        assert_eq!(body.bounding_box, BoundingBox::new(2.0, 4.0, 2.0));
    }
}
