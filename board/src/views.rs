use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::{sync::Mutex, time::Instant};
use tracing::Instrument;

use crate::{
    App,
    gateway::GatewayError,
    post::{
        comment::tree::{Thread, build_thread},
        models::{PostId, vote::Vote},
        vote::reconcile::VoteTally,
    },
};

/// The votes of a post as last fetched, with the tally computed from them.
#[derive(Debug, Clone, PartialEq)]
pub struct PostVotes {
    pub votes: Vec<Vote>,
    pub tally: VoteTally,
}

impl PostVotes {
    pub fn new(votes: Vec<Vote>) -> Self {
        let tally = VoteTally::from_votes(&votes);
        PostVotes { votes, tally }
    }
}

/// Handed out when a fetch starts and presented again when it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    post_id: PostId,
    seq: u64,
}

struct Slot<V> {
    /// Tickets at or below this were issued before the slot existed or before
    /// the last invalidation
    floor: u64,
    applied: u64,
    value: Option<Arc<V>>,
    last_read: Instant,
}

/// Per-post cache of a derived view. A fetch only lands if no newer fetch
/// landed first and the post was not invalidated or forgotten meanwhile, so a
/// slow response can never overwrite a fresher one.
pub struct ViewCache<V> {
    slots: Mutex<HashMap<PostId, Slot<V>>>,
    sequence: AtomicU64,
}

impl<V> Default for ViewCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ViewCache<V> {
    pub fn new() -> Self {
        ViewCache {
            slots: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    pub async fn get(&self, post_id: PostId) -> Option<Arc<V>> {
        let mut slots = self.slots.lock().await;
        let slot = slots.get_mut(&post_id)?;
        slot.last_read = Instant::now();
        slot.value.clone()
    }

    pub async fn begin(&self, post_id: PostId) -> Ticket {
        let mut slots = self.slots.lock().await;
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        slots.entry(post_id).or_insert_with(|| Slot {
            floor: seq - 1,
            applied: seq - 1,
            value: None,
            last_read: Instant::now(),
        });
        Ticket { post_id, seq }
    }

    /// Returns whether the value was stored. A discarded value is stale and
    /// should not be shown if the cache holds something else.
    pub async fn complete(&self, ticket: Ticket, value: Arc<V>) -> bool {
        let mut slots = self.slots.lock().await;
        let Some(slot) = slots.get_mut(&ticket.post_id) else {
            return false;
        };

        if ticket.seq <= slot.floor || ticket.seq <= slot.applied {
            return false;
        }

        slot.applied = ticket.seq;
        slot.value = Some(value);
        true
    }

    /// Drops the cached value and voids every fetch already in flight for the
    /// post.
    pub async fn invalidate(&self, post_id: PostId) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get_mut(&post_id) {
            slot.floor = self.sequence.load(Ordering::Relaxed);
            slot.value = None;
        }
    }

    pub async fn forget(&self, post_id: PostId) {
        self.slots.lock().await.remove(&post_id);
    }

    /// Forgets posts nobody read within `idle` and returns the rest.
    pub async fn sweep(&self, idle: Duration) -> Vec<PostId> {
        let mut slots = self.slots.lock().await;
        slots.retain(|_, slot| slot.last_read.elapsed() < idle);
        slots.keys().copied().collect()
    }
}

#[derive(Default)]
pub struct Views {
    pub threads: ViewCache<Thread>,
    pub votes: ViewCache<PostVotes>,
}

/// Runs `fetch` under a ticket and stores its result unless something fresher
/// arrived meanwhile, in which case the fresher value is returned instead.
async fn refresh_with<V, F>(
    cache: &ViewCache<V>,
    post_id: PostId,
    fetch: F,
) -> Result<Arc<V>, GatewayError>
where
    F: Future<Output = Result<V, GatewayError>>,
{
    let ticket = cache.begin(post_id).await;
    let value = Arc::new(fetch.await?);

    if cache.complete(ticket, value.clone()).await {
        return Ok(value);
    }

    tracing::debug!(post_id, "discarded stale view fetch");
    Ok(cache.get(post_id).await.unwrap_or(value))
}

pub async fn refresh_thread(app: &App, post_id: PostId) -> Result<Arc<Thread>, GatewayError> {
    refresh_with(&app.views.threads, post_id, async {
        let comments = app.gateway.query_comments(post_id).await?;
        let thread = build_thread(comments);
        if !thread.orphans.is_empty() || !thread.duplicates.is_empty() {
            tracing::debug!(
                post_id,
                orphans = ?thread.orphans,
                duplicates = ?thread.duplicates,
                "comments left out of the thread"
            );
        }
        Ok(thread)
    })
    .await
}

pub async fn refresh_votes(app: &App, post_id: PostId) -> Result<Arc<PostVotes>, GatewayError> {
    refresh_with(&app.views.votes, post_id, async {
        Ok(PostVotes::new(app.gateway.query_votes(post_id).await?))
    })
    .await
}

pub async fn thread(app: &App, post_id: PostId) -> Result<Arc<Thread>, GatewayError> {
    match app.views.threads.get(post_id).await {
        Some(thread) => Ok(thread),
        None => refresh_thread(app, post_id).await,
    }
}

pub async fn votes(app: &App, post_id: PostId) -> Result<Arc<PostVotes>, GatewayError> {
    match app.views.votes.get(post_id).await {
        Some(votes) => Ok(votes),
        None => refresh_votes(app, post_id).await,
    }
}

async fn refresh_watched(app: &App) {
    let idle = app.config.view_idle;

    let threads = app.views.threads.sweep(idle).await;
    let votes = app.views.votes.sweep(idle).await;

    let thread_refreshes = threads.iter().map(|&post_id| async move {
        if let Err(err) = refresh_thread(app, post_id).await {
            tracing::warn!(?err, post_id, "thread refresh failed");
        }
    });
    let vote_refreshes = votes.iter().map(|&post_id| async move {
        if let Err(err) = refresh_votes(app, post_id).await {
            tracing::warn!(?err, post_id, "vote refresh failed");
        }
    });

    futures_util::future::join(
        futures_util::future::join_all(thread_refreshes),
        futures_util::future::join_all(vote_refreshes),
    )
    .await;
}

/// Re-fetches every post someone is looking at on a fixed interval.
pub fn start_refresh_loop(app: App) -> tokio::task::JoinHandle<()> {
    let poll_interval = app.config.poll_interval;
    tokio::spawn(
        async move {
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                refresh_watched(&app).await;
            }
        }
        .instrument(tracing::info_span!("view_refresh", ?poll_interval)),
    )
}
