//! Hooks and the render context components receive.
//!
//! A component calls hooks through [`RenderCx`] in the same order on every
//! render. The first render of a fiber mounts each hook; later renders read
//! the hook at the same position from the committed render and build a new
//! record from it, leaving the committed list untouched until commit.

use core::any::Any;
use core::cell::RefCell;
use core::fmt;
use std::rc::{Rc, Weak};

use crate::context::{Context, ContextDependency, ProviderStack};
use crate::element::{Component, Node, NodeRef, Props};
use crate::error::{Error, Interrupt, Render};
use crate::fiber::FiberId;
use crate::flags::{Flags, HookFlags};
use crate::lane::Lanes;
use crate::resource::{Resource, WakeableId};
use crate::ring::Ring;
use crate::update_queue::{Action, SharedQueue, Update, process_update_queue};

/// Channel from hooks and resources back to the root that owns them.
pub(crate) trait RootLink {
    fn request_update_lane(&self) -> Lanes;
    fn schedule_update(&self, fiber: FiberId, lane: Lanes);
    fn ping(&self, wakeable: WakeableId);
    fn enter_transition(&self);
    fn exit_transition(&self);
}

/// A hook record.
#[derive(Clone)]
pub(crate) enum Hook {
    /// `Rc<StateSlot<T>>`, erased.
    State(Rc<dyn Any>),
    Effect(Rc<Effect>),
    /// `Rc<RefCell<T>>`, erased.
    Ref(Rc<dyn Any>),
    Memo { value: Rc<dyn Any>, deps: Deps },
}

impl Hook {
    const fn kind(&self) -> &'static str {
        match self {
            Self::State(_) => "use_state",
            Self::Effect(_) => "use_effect",
            Self::Ref(_) => "use_ref",
            Self::Memo { .. } => "use_memo",
        }
    }
}

struct StateSlot<T> {
    memoized: T,
    base_state: T,
    base_queue: RefCell<Ring<Update<T>>>,
    queue: Rc<SharedQueue<T>>,
    setter: SetState<T>,
}

/// Cleanup returned by an effect.
pub struct Cleanup(Box<dyn FnOnce()>);

impl Cleanup {
    /// Wraps a cleanup closure.
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Box::new(f))
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup(..)")
    }
}

/// Return values accepted from an effect body.
pub trait IntoCleanup {
    /// Converts into an optional cleanup.
    fn into_cleanup(self) -> Option<Cleanup>;
}

impl IntoCleanup for () {
    fn into_cleanup(self) -> Option<Cleanup> {
        None
    }
}

impl IntoCleanup for Cleanup {
    fn into_cleanup(self) -> Option<Cleanup> {
        Some(self)
    }
}

impl IntoCleanup for Option<Cleanup> {
    fn into_cleanup(self) -> Option<Cleanup> {
        self
    }
}

type CreateFn = Box<dyn FnOnce() -> Option<Cleanup>>;

/// Cleanup slot shared by every render's record of one effect hook.
#[derive(Default)]
pub(crate) struct EffectInstance {
    destroy: RefCell<Option<Cleanup>>,
}

/// An effect record produced by one render.
pub(crate) struct Effect {
    pub(crate) tags: HookFlags,
    create: RefCell<Option<CreateFn>>,
    inst: Rc<EffectInstance>,
    deps: Option<Deps>,
}

impl Effect {
    /// Whether the effect fires during the current commit.
    pub(crate) fn fires(&self) -> bool {
        self.tags.contains(HookFlags::PASSIVE | HookFlags::HAS_EFFECT)
    }

    pub(crate) fn run_destroy(&self) {
        let destroy = self.inst.destroy.borrow_mut().take();
        if let Some(Cleanup(destroy)) = destroy {
            destroy();
        }
    }

    pub(crate) fn run_create(&self) {
        let create = self.create.borrow_mut().take();
        if let Some(create) = create {
            let cleanup = create();
            *self.inst.destroy.borrow_mut() = cleanup;
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("tags", &self.tags)
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

/// A value usable in a dependency list.
pub trait DepValue {
    /// Compares with another dependency of any type.
    fn dep_eq(&self, other: &dyn DepValue) -> bool;
    /// Upcast used by [`dep_eq`](Self::dep_eq).
    fn as_any(&self) -> &dyn Any;
}

impl<T: PartialEq + 'static> DepValue for T {
    fn dep_eq(&self, other: &dyn DepValue) -> bool {
        other.as_any().downcast_ref::<T>().is_some_and(|other| other == self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A dependency list compared element-wise between renders.
#[derive(Clone)]
pub struct Deps(Rc<[Box<dyn DepValue>]>);

impl Deps {
    /// Builds a list from boxed values. See [`deps!`](crate::deps).
    #[must_use]
    pub fn new(values: Vec<Box<dyn DepValue>>) -> Self {
        Self(values.into())
    }

    /// A list that never changes.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Number of dependencies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for Deps {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| a.dep_eq(b.as_ref()))
    }
}

impl fmt::Debug for Deps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Deps({})", self.0.len())
    }
}

/// Builds a [`Deps`] list from values implementing `PartialEq`.
#[macro_export]
macro_rules! deps {
    () => {
        $crate::Deps::empty()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::Deps::new(vec![$(Box::new($value) as Box<dyn $crate::DepValue>),+])
    };
}

/// Setter returned by [`RenderCx::use_state`].
pub struct SetState<T> {
    queue: Rc<SharedQueue<T>>,
    fiber: FiberId,
    link: Weak<dyn RootLink>,
}

impl<T: 'static> SetState<T> {
    /// Replaces the state.
    pub fn set(&self, value: T) {
        self.dispatch(Action::Replace(value));
    }

    /// Derives the next state from the previous one.
    pub fn update(&self, f: impl Fn(&T) -> T + 'static) {
        self.dispatch(Action::Reduce(Rc::new(f)));
    }

    fn dispatch(&self, action: Action<T>) {
        let Some(link) = self.link.upgrade() else {
            tracing::trace!("state update after root was dropped");
            return;
        };
        let lane = link.request_update_lane();
        self.queue.enqueue(Update::new(action, lane));
        link.schedule_update(self.fiber, lane);
    }
}

impl<T> Clone for SetState<T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            fiber: self.fiber,
            link: self.link.clone(),
        }
    }
}

impl<T> PartialEq for SetState<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.queue, &other.queue)
    }
}

impl<T> fmt::Debug for SetState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetState").field("fiber", &self.fiber).finish()
    }
}

/// Mutable value persisted across renders, returned by [`RenderCx::use_ref`].
pub struct MutableRef<T>(Rc<RefCell<T>>);

impl<T> MutableRef<T> {
    /// Replaces the value.
    pub fn set(&self, value: T) {
        *self.0.borrow_mut() = value;
    }

    /// Runs `f` with a shared borrow of the value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.0.borrow())
    }

    /// Runs `f` with a mutable borrow of the value.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }
}

impl<T: Clone> MutableRef<T> {
    /// Returns a copy of the value.
    #[must_use]
    pub fn get(&self) -> T {
        self.0.borrow().clone()
    }
}

impl<T> Clone for MutableRef<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for MutableRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MutableRef").field(&self.0.borrow()).finish()
    }
}

/// Starts transitions; returned by [`RenderCx::use_transition`].
#[derive(Clone)]
pub struct StartTransition {
    set_pending: SetState<bool>,
    link: Weak<dyn RootLink>,
}

impl StartTransition {
    /// Runs `f` so that the updates it issues use the transition lane.
    ///
    /// The pending flag is raised at the current lane and lowered inside
    /// the transition, so it reads `true` until the transition commits.
    pub fn start(&self, f: impl FnOnce()) {
        self.set_pending.set(true);
        let link = self.link.upgrade();
        if let Some(link) = &link {
            link.enter_transition();
        }
        self.set_pending.set(false);
        f();
        if let Some(link) = &link {
            link.exit_transition();
        }
    }
}

impl fmt::Debug for StartTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartTransition").finish_non_exhaustive()
    }
}

/// Values a component can read with [`RenderCx::use_value`].
pub trait Usable {
    /// The value produced.
    type Output: 'static;

    /// Reads the value during render.
    ///
    /// # Errors
    ///
    /// Interrupts the render when the value is not available yet.
    fn use_in(&self, cx: &mut RenderCx<'_>) -> Render<Rc<Self::Output>>;
}

impl<T: 'static> Usable for Resource<T> {
    type Output = T;

    fn use_in(&self, _cx: &mut RenderCx<'_>) -> Render<Rc<T>> {
        self.read()
    }
}

impl<T: 'static> Usable for Context<T> {
    type Output = T;

    fn use_in(&self, cx: &mut RenderCx<'_>) -> Render<Rc<T>> {
        Ok(cx.use_context(self))
    }
}

/// Inputs of a component render.
pub(crate) struct RenderArgs<'a> {
    pub(crate) fiber: FiberId,
    pub(crate) lane: Lanes,
    pub(crate) previous: Option<Rc<[Hook]>>,
    pub(crate) link: Weak<dyn RootLink>,
    pub(crate) providers: &'a ProviderStack,
}

/// Outputs of a component render.
pub(crate) struct Rendered {
    pub(crate) children: Node,
    pub(crate) hooks: Vec<Hook>,
    pub(crate) effects: Ring<Rc<Effect>>,
    pub(crate) flags: Flags,
    pub(crate) did_receive_update: bool,
    pub(crate) skipped_lanes: Lanes,
    pub(crate) dependencies: Vec<ContextDependency>,
}

/// Context of one component render. Hooks are methods on this type.
pub struct RenderCx<'a> {
    component: Rc<str>,
    fiber: FiberId,
    lane: Lanes,
    link: Weak<dyn RootLink>,
    providers: &'a ProviderStack,
    previous: Option<Rc<[Hook]>>,
    hooks: Vec<Hook>,
    effects: Ring<Rc<Effect>>,
    flags: Flags,
    did_receive_update: bool,
    skipped_lanes: Lanes,
    dependencies: Vec<ContextDependency>,
    failure: Option<Error>,
}

impl<'a> RenderCx<'a> {
    fn new(component: Rc<str>, args: RenderArgs<'a>) -> Self {
        Self {
            component,
            fiber: args.fiber,
            lane: args.lane,
            link: args.link,
            providers: args.providers,
            previous: args.previous,
            hooks: Vec::new(),
            effects: Ring::new(),
            flags: Flags::empty(),
            did_receive_update: false,
            skipped_lanes: Lanes::empty(),
            dependencies: Vec::new(),
            failure: None,
        }
    }

    /// Name of the component being rendered.
    #[must_use]
    pub fn component_name(&self) -> &str {
        &self.component
    }

    /// Lane being rendered.
    #[must_use]
    pub const fn render_lane(&self) -> Lanes {
        self.lane
    }

    /// Builds an [`Interrupt`] reporting a component failure.
    pub fn fail(&self, message: impl Into<String>) -> Interrupt {
        Error::Component {
            component: self.component.clone(),
            message: message.into(),
        }
        .into()
    }

    fn record(&mut self, error: Error) -> Interrupt {
        if self.failure.is_none() {
            self.failure = Some(error.clone());
        }
        error.into()
    }

    /// Hook at the current position from the previous render, checked
    /// against the kind being called. `None` while mounting.
    fn previous_hook(&mut self, kind: &'static str) -> Render<Option<Hook>> {
        let index = self.hooks.len();
        let Some(previous) = self.previous.clone() else {
            return Ok(None);
        };
        let Some(hook) = previous.get(index) else {
            let error = Error::TooManyHooks {
                component: self.component.clone(),
            };
            return Err(self.record(error));
        };
        if hook.kind() != kind {
            let error = Error::HookOrder {
                component: self.component.clone(),
                index,
                expected: hook.kind(),
                found: kind,
            };
            return Err(self.record(error));
        }
        Ok(Some(hook.clone()))
    }

    fn type_error(&mut self) -> Interrupt {
        let error = Error::StateType {
            component: self.component.clone(),
            index: self.hooks.len(),
        };
        self.record(error)
    }

    /// Declares a state cell.
    ///
    /// `init` runs on mount only. Later renders fold the queued updates
    /// whose lanes are being rendered; the others stay queued for a later
    /// render at their lane.
    ///
    /// # Errors
    ///
    /// Fails when hooks are called in a different order or count than
    /// during the previous render.
    pub fn use_state<T>(&mut self, init: impl FnOnce() -> T) -> Render<(T, SetState<T>)>
    where
        T: Clone + PartialEq + 'static,
    {
        let Some(previous) = self.previous_hook("use_state")? else {
            let value = init();
            let queue = Rc::new(SharedQueue::new());
            let setter = SetState {
                queue: queue.clone(),
                fiber: self.fiber,
                link: self.link.clone(),
            };
            let slot = StateSlot {
                memoized: value.clone(),
                base_state: value.clone(),
                base_queue: RefCell::new(Ring::new()),
                queue,
                setter: setter.clone(),
            };
            self.hooks.push(Hook::State(Rc::new(slot)));
            return Ok((value, setter));
        };

        let Hook::State(erased) = previous else {
            unreachable!("hook kind checked by previous_hook");
        };
        let Ok(slot) = erased.downcast::<StateSlot<T>>() else {
            return Err(self.type_error());
        };

        let pending = slot.queue.take_pending();
        slot.base_queue.borrow_mut().append(pending);
        let processed = process_update_queue(&slot.base_state, &slot.base_queue.borrow(), self.lane);

        if processed.memoized_state != slot.memoized {
            self.did_receive_update = true;
        }
        self.skipped_lanes |= processed.skipped_lanes;

        let value = processed.memoized_state.clone();
        let setter = slot.setter.clone();
        self.hooks.push(Hook::State(Rc::new(StateSlot {
            memoized: processed.memoized_state,
            base_state: processed.base_state,
            base_queue: RefCell::new(processed.base_queue),
            queue: slot.queue.clone(),
            setter: setter.clone(),
        })));
        Ok((value, setter))
    }

    /// Declares a passive effect.
    ///
    /// With `deps` of `None` the effect fires after every commit. Otherwise
    /// it fires on mount and whenever the list differs element-wise from the
    /// previous render's; its previous cleanup runs first.
    ///
    /// # Errors
    ///
    /// Fails when hooks are called out of order.
    pub fn use_effect<F, C>(&mut self, deps: Option<Deps>, create: F) -> Render<()>
    where
        F: FnOnce() -> C + 'static,
        C: IntoCleanup,
    {
        let previous = self.previous_hook("use_effect")?;
        let (inst, changed) = match previous {
            Some(Hook::Effect(previous)) => {
                let unchanged = match (&deps, &previous.deps) {
                    (Some(next), Some(prev)) => next == prev,
                    _ => false,
                };
                (previous.inst.clone(), !unchanged)
            }
            _ => (Rc::new(EffectInstance::default()), true),
        };

        let tags = if changed {
            self.flags |= Flags::PASSIVE_EFFECT;
            HookFlags::PASSIVE | HookFlags::HAS_EFFECT
        } else {
            HookFlags::PASSIVE
        };
        let create: CreateFn = Box::new(move || create().into_cleanup());
        let effect = Rc::new(Effect {
            tags,
            create: RefCell::new(Some(create)),
            inst,
            deps,
        });
        self.effects.push(effect.clone());
        self.hooks.push(Hook::Effect(effect));
        Ok(())
    }

    /// Declares a mutable value that survives renders without triggering them.
    ///
    /// # Errors
    ///
    /// Fails when hooks are called out of order or the value type changes.
    pub fn use_ref<T: 'static>(&mut self, init: impl FnOnce() -> T) -> Render<MutableRef<T>> {
        match self.previous_hook("use_ref")? {
            Some(Hook::Ref(erased)) => {
                let Ok(cell) = erased.clone().downcast::<RefCell<T>>() else {
                    return Err(self.type_error());
                };
                self.hooks.push(Hook::Ref(erased));
                Ok(MutableRef(cell))
            }
            _ => {
                let cell = Rc::new(RefCell::new(init()));
                self.hooks.push(Hook::Ref(cell.clone()));
                Ok(MutableRef(cell))
            }
        }
    }

    /// Declares a [`NodeRef`] to attach to a host element.
    ///
    /// # Errors
    ///
    /// Fails when hooks are called out of order.
    pub fn use_node_ref(&mut self) -> Render<NodeRef> {
        self.use_ref(NodeRef::new).map(|cell| cell.get())
    }

    /// Caches `compute()` until `deps` changes.
    ///
    /// # Errors
    ///
    /// Fails when hooks are called out of order or the value type changes.
    pub fn use_memo<T: 'static>(&mut self, deps: Deps, compute: impl FnOnce() -> T) -> Render<Rc<T>> {
        if let Some(Hook::Memo { value, deps: previous }) = self.previous_hook("use_memo")? {
            if previous == deps {
                let Ok(cached) = value.clone().downcast::<T>() else {
                    return Err(self.type_error());
                };
                self.hooks.push(Hook::Memo { value, deps: previous });
                return Ok(cached);
            }
        }
        let value = Rc::new(compute());
        self.hooks.push(Hook::Memo {
            value: value.clone(),
            deps,
        });
        Ok(value)
    }

    /// Caches a callback until `deps` changes.
    ///
    /// # Errors
    ///
    /// Fails when hooks are called out of order.
    pub fn use_callback<F: 'static>(&mut self, deps: Deps, callback: F) -> Render<Rc<F>> {
        self.use_memo(deps, || callback)
    }

    /// Declares a transition: a pending flag and a starter that runs
    /// updates at the transition lane.
    ///
    /// # Errors
    ///
    /// Fails when hooks are called out of order.
    pub fn use_transition(&mut self) -> Render<(bool, StartTransition)> {
        let (pending, set_pending) = self.use_state(|| false)?;
        let link = self.link.clone();
        let start = self.use_memo(Deps::empty(), move || StartTransition { set_pending, link })?;
        Ok((pending, (*start).clone()))
    }

    /// Reads the nearest provided value of `context` and subscribes to changes.
    pub fn use_context<T: 'static>(&mut self, context: &Context<T>) -> Rc<T> {
        let provided = self.providers.read(context.id());
        self.dependencies.push(ContextDependency {
            context: context.id(),
            observed: provided.clone(),
        });
        provided
            .and_then(|value| value.downcast::<T>().ok())
            .unwrap_or_else(|| context.default_value())
    }

    /// Reads a [`Resource`] or [`Context`].
    ///
    /// # Errors
    ///
    /// Suspends while a resource is pending; fails once it is rejected.
    pub fn use_value<U: Usable>(&mut self, usable: &U) -> Render<Rc<U::Output>> {
        usable.use_in(self)
    }
}

impl fmt::Debug for RenderCx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderCx")
            .field("component", &self.component)
            .field("fiber", &self.fiber)
            .field("lane", &self.lane)
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

/// Renders `component` with hook state from `args.previous`.
pub(crate) fn render_with_hooks(component: &Component, props: &Props, args: RenderArgs<'_>) -> Render<Rendered> {
    let mut cx = RenderCx::new(component.name().clone(), args);
    let result = component.render(&mut cx, props);
    if let Some(error) = cx.failure.take() {
        return Err(Interrupt::Error(error));
    }
    let children = result?;
    if let Some(previous) = &cx.previous {
        if cx.hooks.len() < previous.len() {
            return Err(Error::TooFewHooks {
                component: cx.component.clone(),
            }
            .into());
        }
    }
    Ok(Rendered {
        children,
        hooks: cx.hooks,
        effects: cx.effects,
        flags: cx.flags,
        did_receive_update: cx.did_receive_update,
        skipped_lanes: cx.skipped_lanes,
        dependencies: cx.dependencies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ProviderStack;
    use core::cell::Cell;

    struct NullLink;

    impl RootLink for NullLink {
        fn request_update_lane(&self) -> Lanes {
            Lanes::DEFAULT
        }
        fn schedule_update(&self, _fiber: FiberId, _lane: Lanes) {}
        fn ping(&self, _wakeable: WakeableId) {}
        fn enter_transition(&self) {}
        fn exit_transition(&self) {}
    }

    fn render(
        component: &Component,
        previous: Option<Rc<[Hook]>>,
        link: &Rc<NullLink>,
    ) -> Render<Rendered> {
        let providers = ProviderStack::default();
        let weak: Weak<dyn RootLink> = Rc::downgrade(link) as Weak<dyn RootLink>;
        render_with_hooks(
            component,
            &Props::default(),
            RenderArgs {
                fiber: FiberId::default(),
                lane: Lanes::DEFAULT,
                previous,
                link: weak,
                providers: &providers,
            },
        )
    }

    #[test]
    fn mount_marks_effect_and_update_skips_unchanged_deps() {
        let component = Component::new("Effects", |cx, _| {
            cx.use_effect(Some(deps![1_u8]), || ())?;
            Ok(Node::Empty)
        });
        let link = Rc::new(NullLink);

        let first = render(&component, None, &link).expect("mount");
        assert!(first.flags.contains(Flags::PASSIVE_EFFECT));
        assert!(first.effects.iter().all(|effect| effect.fires()));

        let second = render(&component, Some(first.hooks.into()), &link).expect("update");
        assert!(!second.flags.contains(Flags::PASSIVE_EFFECT));
        assert!(second.effects.iter().all(|effect| !effect.fires()));
    }

    #[test]
    fn state_setter_enqueues_and_update_applies() {
        let setter_slot: Rc<RefCell<Option<SetState<i32>>>> = Rc::default();
        let captured = setter_slot.clone();
        let component = Component::new("Counter", move |cx, _| {
            let (value, set) = cx.use_state(|| 1)?;
            *captured.borrow_mut() = Some(set);
            Ok(crate::element::text(value.to_string()))
        });
        let link = Rc::new(NullLink);

        let first = render(&component, None, &link).expect("mount");
        assert!(!first.did_receive_update);

        let set = setter_slot.borrow().clone().expect("setter");
        set.update(|n| n + 41);

        let second = render(&component, Some(first.hooks.into()), &link).expect("update");
        assert!(second.did_receive_update);
        assert!(matches!(second.children, Node::Text(ref t) if &**t == "42"));
    }

    #[test]
    fn hook_count_mismatch_is_fatal() {
        let extra = Rc::new(Cell::new(false));
        let flag = extra.clone();
        let component = Component::new("Flaky", move |cx, _| {
            cx.use_state(|| 0)?;
            if flag.get() {
                cx.use_state(|| 0)?;
            }
            Ok(Node::Empty)
        });
        let link = Rc::new(NullLink);

        let first = render(&component, None, &link).expect("mount");
        let hooks: Rc<[Hook]> = first.hooks.into();

        extra.set(true);
        let grown = render(&component, Some(hooks.clone()), &link);
        assert!(matches!(grown, Err(Interrupt::Error(Error::TooManyHooks { .. }))));

        let two = Component::new("Shrinks", |cx, _| {
            cx.use_state(|| 0)?;
            cx.use_state(|| 0)?;
            Ok(Node::Empty)
        });
        let first = render(&two, None, &link).expect("mount");
        let one = Component::new("Shrinks", |cx, _| {
            cx.use_state(|| 0)?;
            Ok(Node::Empty)
        });
        let shrunk = render(&one, Some(first.hooks.into()), &link);
        assert!(matches!(shrunk, Err(Interrupt::Error(Error::TooFewHooks { .. }))));
    }

    #[test]
    fn hook_order_mismatch_is_fatal() {
        let link = Rc::new(NullLink);
        let state_first = Component::new("Order", |cx, _| {
            cx.use_state(|| 0)?;
            Ok(Node::Empty)
        });
        let first = render(&state_first, None, &link).expect("mount");

        let ref_first = Component::new("Order", |cx, _| {
            cx.use_ref(|| 0)?;
            Ok(Node::Empty)
        });
        let result = render(&ref_first, Some(first.hooks.into()), &link);
        assert!(matches!(
            result,
            Err(Interrupt::Error(Error::HookOrder { expected: "use_state", found: "use_ref", .. }))
        ));
    }

    #[test]
    fn ignored_hook_error_still_fails_the_render() {
        let link = Rc::new(NullLink);
        let mount = Component::new("Ignores", |cx, _| {
            cx.use_state(|| 0)?;
            Ok(Node::Empty)
        });
        let first = render(&mount, None, &link).expect("mount");

        let ignoring = Component::new("Ignores", |cx, _| {
            let _ = cx.use_memo(Deps::empty(), || 0);
            Ok(Node::Empty)
        });
        let result = render(&ignoring, Some(first.hooks.into()), &link);
        assert!(matches!(result, Err(Interrupt::Error(Error::HookOrder { .. }))));
    }

    #[test]
    fn memo_recomputes_only_when_deps_change() {
        let calls = Rc::new(Cell::new(0));
        let dep = Rc::new(Cell::new(1_u32));
        let (c, d) = (calls.clone(), dep.clone());
        let component = Component::new("Memo", move |cx, _| {
            let c = c.clone();
            cx.use_memo(deps![d.get()], move || c.set(c.get() + 1))?;
            Ok(Node::Empty)
        });
        let link = Rc::new(NullLink);

        let first = render(&component, None, &link).expect("mount");
        let second = render(&component, Some(first.hooks.into()), &link).expect("same deps");
        assert_eq!(calls.get(), 1);

        dep.set(2);
        render(&component, Some(second.hooks.into()), &link).expect("new deps");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn deps_compare_by_value_and_type() {
        assert_eq!(deps![1_i32, "a"], deps![1_i32, "a"]);
        assert_ne!(deps![1_i32], deps![2_i32]);
        assert_ne!(deps![1_i32], deps![1_i64]);
        assert_ne!(deps![1_i32], deps![1_i32, 2_i32]);
    }
}
