#![forbid(unsafe_code)]

//! Per-component hook state and the component render session.
//!
//! A component renders under a [`HookCx`]: the explicit session object
//! that replaces a global dispatcher. Every hook call walks the session's
//! cursor forward; on update renders the cursor moves through the
//! alternate's hook list in lockstep, cloning each record into the new
//! list. The number and kind-order of hook calls must be identical between
//! a component's mount and every later render; a mismatch is fatal, never
//! silently recovered.
//!
//! Effects are collected, not executed: `use_effect` appends a tagged
//! record to the fiber's effect list and the asynchronous passive flush
//! runs create/destroy callbacks after commit.
//!
//! # Failure Modes
//!
//! - **Hook order/count drift** → [`RenderError::HookOrder`] /
//!   `HookCountExceeded` / `HookCountShortfall`, all fatal.
//! - **State type drift** (same slot, different `T`) →
//!   [`RenderError::StateType`], fatal.
//! - **Dispatch after the root was dropped** → warn and drop the update.

use std::any::Any;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use ahash::AHashMap;

use crate::element::{Context, ContextId, ContextValue, ElementKind, Node, Props};
use crate::error::{RenderError, Result};
use crate::flags::{EffectTag, FiberFlags};
use crate::lanes::Lanes;
use crate::root::{RootCore, RootLink, WeakLink, request_update_lane, schedule_update_on_root};
use crate::fiber::{FiberId, FiberState};
use crate::update_queue::{
    SharedQueue, Update, UpdateAction, process_update_queue, shared_queue,
};

/// Type-erased hook state value.
pub(crate) type StateValue = Rc<dyn Any>;

/// Cleanup returned by an effect's create callback.
pub type EffectCleanup = Rc<dyn Fn()>;

/// An effect's create callback; may return a cleanup.
pub type EffectCreate = Rc<dyn Fn() -> Option<EffectCleanup>>;

/// A dependency snapshot entry, compared positionally and shallowly.
#[derive(Debug, Clone, PartialEq)]
pub enum HookDep {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl From<i64> for HookDep {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for HookDep {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<usize> for HookDep {
    fn from(value: usize) -> Self {
        Self::Int(value as i64)
    }
}

impl From<f64> for HookDep {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for HookDep {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for HookDep {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for HookDep {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// One collected effect record.
#[derive(Clone)]
pub struct Effect {
    pub tag: EffectTag,
    pub create: EffectCreate,
    pub destroy: Option<EffectCleanup>,
    pub deps: Option<Vec<HookDep>>,
}

/// A fiber's effect list for one render, shared with the passive flush.
pub type EffectList = Rc<RefCell<Vec<Effect>>>;

/// State hook record.
#[derive(Clone)]
pub(crate) struct StateHook {
    pub memoized: StateValue,
    pub base_state: StateValue,
    pub base_queue: Vec<Update<StateValue>>,
    pub queue: SharedQueue<StateValue>,
}

#[derive(Clone)]
pub(crate) enum HookKind {
    State(StateHook),
    Effect { list: EffectList, index: usize },
    Ref(Rc<dyn Any>),
    Transition(TransitionStarter),
}

impl HookKind {
    fn name(&self) -> &'static str {
        match self {
            Self::State(_) => "state",
            Self::Effect { .. } => "effect",
            Self::Ref(_) => "ref",
            Self::Transition(_) => "transition",
        }
    }
}

/// One slot in a component's hook list.
#[derive(Clone)]
pub struct Hook {
    pub(crate) kind: HookKind,
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hook({})", self.kind.name())
    }
}

/// Setter half of a `use_state` pair.
///
/// Cloneable and usable from anywhere (event handlers, effects, tests);
/// dispatching enqueues an update at the ambient lane and schedules the
/// root. A dispatch never starts a nested render.
pub struct Dispatch<T> {
    queue: SharedQueue<StateValue>,
    link: WeakLink,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Dispatch<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Rc::clone(&self.queue),
            link: self.link.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Clone + 'static> Dispatch<T> {
    /// Replace the state.
    pub fn set(&self, value: T) {
        self.dispatch(UpdateAction::Replace(Rc::new(value) as StateValue));
    }

    /// Derive the next state from the previous one. `f` must be pure; it
    /// can run any number of times across priority restarts.
    pub fn update(&self, f: impl Fn(&T) -> T + 'static) {
        let action = UpdateAction::Apply(Rc::new(move |prev: &StateValue| -> StateValue {
            match prev.downcast_ref::<T>() {
                Some(value) => Rc::new(f(value)) as StateValue,
                None => {
                    tracing::error!("state updater type mismatch; keeping previous value");
                    Rc::clone(prev)
                }
            }
        }));
        self.dispatch(action);
    }

    fn dispatch(&self, action: UpdateAction<StateValue>) {
        let Some(link) = self.link.upgrade() else {
            tracing::warn!("dispatch after root dropped; update ignored");
            return;
        };
        let lane = request_update_lane(&link);
        self.queue.borrow_mut().enqueue(Update::new(action, lane));
        tracing::debug!(lane = lane.bits(), "hooks.dispatch");
        schedule_update_on_root(&link, lane);
    }
}

/// Starts a transition scope: updates dispatched inside the scope are
/// tagged with the transition lane instead of the ambient one.
#[derive(Clone)]
pub struct TransitionStarter {
    set_pending: Dispatch<bool>,
    link: WeakLink,
}

impl TransitionStarter {
    /// Flip the pending flag at the ambient lane, run `scope` with the
    /// transition flag raised, and clear the pending flag while still
    /// inside the scope so the clear itself rides the transition lane.
    pub fn start(&self, scope: impl FnOnce()) {
        self.set_pending.set(true);
        let Some(link) = self.link.upgrade() else {
            return;
        };
        let previous = {
            let mut shared = link.shared.borrow_mut();
            std::mem::replace(&mut shared.transition, 1)
        };
        scope();
        self.set_pending.set(false);
        link.shared.borrow_mut().transition = previous;
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum HookMode {
    Mount,
    Update,
}

/// The render session a component executes under.
///
/// Owns its own working data (no borrow of the fiber arena crosses the
/// component call), so components may dispatch state updates mid-render;
/// those enqueue and schedule without re-entering the render.
pub struct HookCx {
    mode: HookMode,
    lane: Lanes,
    props: Props,
    current_hooks: Vec<Hook>,
    cursor: usize,
    built: Vec<Hook>,
    effects: EffectList,
    flags: FiberFlags,
    link: RootLink,
    contexts: AHashMap<ContextId, ContextValue>,
}

impl HookCx {
    /// Props passed to the component by its parent.
    #[must_use]
    pub fn props(&self) -> &Props {
        &self.props
    }

    /// Declare a state cell with an eagerly computed initial value.
    pub fn use_state<T: Clone + 'static>(&mut self, initial: T) -> Result<(T, Dispatch<T>)> {
        self.use_state_with(move || initial)
    }

    /// Declare a state cell; `init` runs only on mount.
    pub fn use_state_with<T: Clone + 'static>(
        &mut self,
        init: impl FnOnce() -> T,
    ) -> Result<(T, Dispatch<T>)> {
        match self.mode {
            HookMode::Mount => {
                let typed = Rc::new(init());
                let value: StateValue = Rc::clone(&typed) as StateValue;
                let queue = shared_queue::<StateValue>();
                self.built.push(Hook {
                    kind: HookKind::State(StateHook {
                        memoized: Rc::clone(&value),
                        base_state: value,
                        base_queue: Vec::new(),
                        queue: Rc::clone(&queue),
                    }),
                });
                self.cursor += 1;
                let dispatch = Dispatch {
                    queue,
                    link: self.link.downgrade(),
                    _marker: PhantomData,
                };
                Ok(((*typed).clone(), dispatch))
            }
            HookMode::Update => {
                let index = self.cursor;
                let current = self.take_current("state")?;
                let HookKind::State(cur) = current.kind else {
                    return Err(RenderError::HookOrder {
                        index,
                        expected: "state",
                        found: current.kind.name(),
                    });
                };

                let mut merged = cur.base_queue.clone();
                let mut pending = cur.queue.borrow_mut().take_pending();
                if !pending.is_empty() {
                    merged.append(&mut pending);
                    // Persist the merged queue on the current-side record:
                    // an abandoned work-in-progress must not lose updates
                    // that were drained from the shared queue.
                    if let HookKind::State(snapshot) = &mut self.current_hooks[index].kind {
                        snapshot.base_queue = merged.clone();
                    }
                }

                let processed =
                    process_update_queue(Rc::clone(&cur.base_state), &merged, self.lane);
                let memoized = Rc::clone(&processed.memoized_state);
                self.built.push(Hook {
                    kind: HookKind::State(StateHook {
                        memoized: Rc::clone(&memoized),
                        base_state: processed.base_state,
                        base_queue: processed.base_queue,
                        queue: Rc::clone(&cur.queue),
                    }),
                });

                let typed = memoized
                    .downcast::<T>()
                    .map_err(|_| RenderError::StateType { index })?;
                let dispatch = Dispatch {
                    queue: cur.queue,
                    link: self.link.downgrade(),
                    _marker: PhantomData,
                };
                Ok(((*typed).clone(), dispatch))
            }
        }
    }

    /// Register a passive effect. With `deps` absent the effect re-runs
    /// after every commit; with `deps` present it re-runs only when the
    /// snapshot differs positionally from the previous render's.
    pub fn use_effect(
        &mut self,
        create: impl Fn() -> Option<EffectCleanup> + 'static,
        deps: Option<Vec<HookDep>>,
    ) -> Result<()> {
        let create: EffectCreate = Rc::new(create);
        match self.mode {
            HookMode::Mount => {
                self.flags |= FiberFlags::PASSIVE_EFFECT;
                self.push_effect(EffectTag::PASSIVE | EffectTag::HAS_EFFECT, create, None, deps);
                self.cursor += 1;
                Ok(())
            }
            HookMode::Update => {
                let index = self.cursor;
                let current = self.take_current("effect")?;
                let HookKind::Effect {
                    list,
                    index: prev_index,
                } = current.kind
                else {
                    return Err(RenderError::HookOrder {
                        index,
                        expected: "effect",
                        found: current.kind.name(),
                    });
                };

                let (destroy, prev_deps) = {
                    let effects = list.borrow();
                    let prev = &effects[prev_index];
                    (prev.destroy.clone(), prev.deps.clone())
                };
                let unchanged = matches!(
                    (&deps, &prev_deps),
                    (Some(next), Some(prev)) if next == prev
                );
                if unchanged {
                    self.push_effect(EffectTag::PASSIVE, create, destroy, deps);
                } else {
                    self.flags |= FiberFlags::PASSIVE_EFFECT;
                    self.push_effect(
                        EffectTag::PASSIVE | EffectTag::HAS_EFFECT,
                        create,
                        destroy,
                        deps,
                    );
                }
                Ok(())
            }
        }
    }

    /// A mutable cell whose identity is stable across renders.
    pub fn use_ref<T: 'static>(&mut self, init: impl FnOnce() -> T) -> Result<Rc<RefCell<T>>> {
        match self.mode {
            HookMode::Mount => {
                let cell = Rc::new(RefCell::new(init()));
                let erased: Rc<dyn Any> = Rc::clone(&cell) as Rc<dyn Any>;
                self.built.push(Hook {
                    kind: HookKind::Ref(erased),
                });
                self.cursor += 1;
                Ok(cell)
            }
            HookMode::Update => {
                let index = self.cursor;
                let current = self.take_current("ref")?;
                let HookKind::Ref(erased) = current.kind else {
                    return Err(RenderError::HookOrder {
                        index,
                        expected: "ref",
                        found: current.kind.name(),
                    });
                };
                let cell = Rc::clone(&erased)
                    .downcast::<RefCell<T>>()
                    .map_err(|_| RenderError::StateType { index })?;
                self.built.push(Hook {
                    kind: HookKind::Ref(erased),
                });
                Ok(cell)
            }
        }
    }

    /// A pending flag plus a starter that tags enclosed updates with the
    /// transition lane.
    pub fn use_transition(&mut self) -> Result<(bool, TransitionStarter)> {
        let (pending, set_pending) = self.use_state(false)?;
        match self.mode {
            HookMode::Mount => {
                let starter = TransitionStarter {
                    set_pending,
                    link: self.link.downgrade(),
                };
                self.built.push(Hook {
                    kind: HookKind::Transition(starter.clone()),
                });
                self.cursor += 1;
                Ok((pending, starter))
            }
            HookMode::Update => {
                let index = self.cursor;
                let current = self.take_current("transition")?;
                let HookKind::Transition(starter) = current.kind else {
                    return Err(RenderError::HookOrder {
                        index,
                        expected: "transition",
                        found: current.kind.name(),
                    });
                };
                self.built.push(Hook {
                    kind: HookKind::Transition(starter.clone()),
                });
                Ok((pending, starter))
            }
        }
    }

    /// Read the innermost enclosing provider's value for `context`, or the
    /// context default. Not a positional hook: reads do not consume a slot.
    pub fn use_context<T: 'static>(&self, context: &Context<T>) -> Result<Rc<T>> {
        match self.contexts.get(&context.id()) {
            Some(value) => context.downcast(value),
            None => Ok(context.default_value()),
        }
    }

    fn push_effect(
        &mut self,
        tag: EffectTag,
        create: EffectCreate,
        destroy: Option<EffectCleanup>,
        deps: Option<Vec<HookDep>>,
    ) {
        let index = {
            let mut effects = self.effects.borrow_mut();
            effects.push(Effect {
                tag,
                create,
                destroy,
                deps,
            });
            effects.len() - 1
        };
        self.built.push(Hook {
            kind: HookKind::Effect {
                list: Rc::clone(&self.effects),
                index,
            },
        });
    }

    /// Advance the lockstep cursor, cloning the alternate's record.
    fn take_current(&mut self, expected: &'static str) -> Result<Hook> {
        if self.cursor >= self.current_hooks.len() {
            tracing::error!(expected, "hook count exceeded previous render");
            return Err(RenderError::HookCountExceeded);
        }
        let hook = self.current_hooks[self.cursor].clone();
        self.cursor += 1;
        Ok(hook)
    }
}

/// Run a component fiber's function under a fresh hook session and return
/// the child description it produced.
///
/// The alternate's hook list is snapshotted into the session before the
/// call and written back afterwards (merged pending queues included) even
/// when the component fails, so an interrupted or abandoned render never
/// loses drained updates.
pub(crate) fn render_with_hooks(
    core: &mut RootCore,
    link: &RootLink,
    wip: FiberId,
    lane: Lanes,
) -> Result<Node> {
    let (component, props, alternate) = {
        let fiber = core.arena.get(wip);
        let Some(ElementKind::Component(component)) = fiber.ty.clone() else {
            unreachable!("render_with_hooks on a non-component fiber");
        };
        let props = fiber.pending_props.props().cloned().unwrap_or_default();
        (component, props, fiber.alternate)
    };

    let current_hooks = match alternate {
        Some(current) => match &core.arena.get(current).state {
            FiberState::Hooks(hooks) => hooks.clone(),
            _ => Vec::new(),
        },
        None => Vec::new(),
    };
    let mode = if alternate.is_some() {
        HookMode::Update
    } else {
        HookMode::Mount
    };
    let expected_hooks = current_hooks.len();

    let mut cx = HookCx {
        mode,
        lane,
        props,
        current_hooks,
        cursor: 0,
        built: Vec::new(),
        effects: Rc::new(RefCell::new(Vec::new())),
        flags: FiberFlags::empty(),
        link: link.clone(),
        contexts: core.context_tops(),
    };

    let result = (component)(&mut cx);

    let HookCx {
        current_hooks,
        cursor,
        built,
        effects,
        flags,
        ..
    } = cx;

    // Write-back happens on every exit path.
    if let Some(current) = alternate {
        core.arena.get_mut(current).state = FiberState::Hooks(current_hooks);
    }

    let children = result?;
    if mode == HookMode::Update && cursor < expected_hooks {
        tracing::error!(
            rendered = cursor,
            expected = expected_hooks,
            "hook count fell short of previous render"
        );
        return Err(RenderError::HookCountShortfall);
    }

    let fiber = core.arena.get_mut(wip);
    fiber.state = FiberState::Hooks(built);
    fiber.effects = Some(effects);
    fiber.flags |= flags;
    Ok(children)
}
