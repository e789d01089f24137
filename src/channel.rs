//! A broadcast channel with independent per-subscriber cursors
//! (SPEC_FULL.md §4.4), the one exemplar coordination primitive built on
//! top of suspension. Grounded directly on the spec text — no single
//! teacher/pack file specifies this exact shape — but the "subscriber
//! cursor into a shared log, messages cloned out to each reader" design
//! mirrors `tokio::sync::broadcast`, which imposes the same `T: Clone`
//! requirement for the same reason.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

struct ChannelInner<M> {
    buffer: RefCell<Vec<M>>,
    closed: Cell<bool>,
    subscribers: RefCell<Vec<Weak<SubscriptionInner<M>>>>,
}

struct SubscriptionInner<M> {
    channel: Rc<ChannelInner<M>>,
    pos: Cell<usize>,
    wakers: RefCell<Vec<Waker>>,
}

/// The sending half of a channel: `input.send(m)` in SPEC_FULL.md §6.
#[derive(Clone)]
pub struct Sender<M> {
    inner: Rc<ChannelInner<M>>,
}

/// An independent read cursor over a channel's post-subscription message
/// stream (the GLOSSARY's "Subscription").
pub struct Subscription<M> {
    inner: Rc<SubscriptionInner<M>>,
}

/// Create a channel, returning its sender and a function to create new
/// subscriptions, matching `createChannel<M>() -> { input, output }` from
/// SPEC_FULL.md §6.
pub fn channel<M>() -> (Sender<M>, Receiver<M>) {
    let inner = Rc::new(ChannelInner {
        buffer: RefCell::new(Vec::new()),
        closed: Cell::new(false),
        subscribers: RefCell::new(Vec::new()),
    });
    (Sender { inner: inner.clone() }, Receiver { inner })
}

/// The subscribing half of a channel: `output: Operation<Subscription>` in
/// SPEC_FULL.md §6 — creating a new independent cursor is itself cheap and
/// synchronous here, so `subscribe` is a plain method rather than an
/// async one.
#[derive(Clone)]
pub struct Receiver<M> {
    inner: Rc<ChannelInner<M>>,
}

impl<M> Sender<M> {
    /// `send`: completes synchronously, no buffering semantics beyond
    /// per-subscriber position (§4.4) — slow subscribers retain messages
    /// by holding their cursor back, not by us holding extra state per
    /// subscriber.
    pub fn send(&self, message: M)
    where
        M: Clone,
    {
        self.inner.buffer.borrow_mut().push(message);
        self.wake_all();
    }

    /// Close the channel: outstanding and future `next()` calls resolve
    /// with `None` ("done: true" in SPEC_FULL.md §4.4).
    pub fn close(&self) {
        self.inner.closed.set(true);
        self.wake_all();
    }

    fn wake_all(&self) {
        let mut subscribers = self.inner.subscribers.borrow_mut();
        subscribers.retain(|weak| weak.strong_count() > 0);
        for weak in subscribers.iter() {
            if let Some(sub) = weak.upgrade() {
                for waker in sub.wakers.borrow_mut().drain(..) {
                    waker.wake();
                }
            }
        }
    }
}

impl<M> Receiver<M> {
    pub fn subscribe(&self) -> Subscription<M> {
        let pos = self.inner.buffer.borrow().len();
        let sub = Rc::new(SubscriptionInner {
            channel: self.inner.clone(),
            pos: Cell::new(pos),
            wakers: RefCell::new(Vec::new()),
        });
        self.inner.subscribers.borrow_mut().push(Rc::downgrade(&sub));
        Subscription { inner: sub }
    }
}

impl<M: Clone> Subscription<M> {
    /// The next un-consumed message for this subscriber, suspending until
    /// one is available or the channel closes.
    pub fn next(&self) -> Next<'_, M> {
        Next { sub: &self.inner }
    }
}

pub struct Next<'a, M> {
    sub: &'a Rc<SubscriptionInner<M>>,
}

impl<'a, M: Clone> Future for Next<'a, M> {
    type Output = Option<M>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let sub = self.sub;
        let buffer = sub.channel.buffer.borrow();
        let pos = sub.pos.get();
        if pos < buffer.len() {
            sub.pos.set(pos + 1);
            return Poll::Ready(Some(buffer[pos].clone()));
        }
        drop(buffer);
        if sub.channel.closed.get() {
            return Poll::Ready(None);
        }
        sub.wakers.borrow_mut().push(cx.waker().clone());
        Poll::Pending
    }
}
