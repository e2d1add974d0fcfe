//! Live event feed over Server-Sent Events.
//!
//! A subscriber first receives a replay of the most recent bus events in
//! chronological order, then everything broadcast from that point on. The
//! `category` query parameter narrows the feed to one audience; `replay`
//! bounds how much history a late joiner gets.

use std::convert::Infallible;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{self, KeepAlive, Sse};
use futures_core::Stream;
use serde::Deserialize;

use cur_core::events::{Event, EventBus, EventCategory};

use crate::context::AppContext;

const DEFAULT_REPLAY: usize = 50;
const HEARTBEAT: Duration = Duration::from_secs(15);

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// `admin` or `user`; anything else means no filtering.
    pub category: Option<String>,
    /// How many recent events to replay on connect.
    pub replay: Option<usize>,
}

fn parse_filter(raw: Option<&str>) -> Option<EventCategory> {
    match raw {
        Some("admin") => Some(EventCategory::Admin),
        Some("user") => Some(EventCategory::User),
        _ => None,
    }
}

/// Domain-level feed: replay (oldest first), then live events, both filtered.
/// Ends when the bus is dropped. Heartbeats and SSE framing live in the
/// handler so this part stays testable.
fn event_feed(
    bus: Arc<EventBus>,
    filter: Option<EventCategory>,
    replay: usize,
) -> impl Stream<Item = Event> {
    // Subscribe before replaying so nothing falls in the gap; an event
    // landing in between shows up at most twice, never zero times.
    let mut rx = bus.subscribe();
    let backlog = bus.recent_events(replay);

    async_stream::stream! {
        for event in backlog.into_iter().rev() {
            if filter.is_none_or(|want| event.category == want) {
                yield event;
            }
        }

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if filter.is_none_or(|want| event.category == want) {
                        yield event;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(missed = n, "slow event feed subscriber skipped ahead");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

fn render(event: &Event) -> Option<sse::Event> {
    let name = match event.category {
        EventCategory::Admin => "admin",
        EventCategory::User => "user",
    };
    let data = serde_json::to_string(event).ok()?;
    Some(sse::Event::default().event(name).data(data))
}

/// GET /api/events -- the event feed as an SSE stream.
pub async fn events_handler(
    State(ctx): State<AppContext>,
    Query(params): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<sse::Event, Infallible>>> {
    let filter = parse_filter(params.category.as_deref());
    let replay = params.replay.unwrap_or(DEFAULT_REPLAY);
    let feed = event_feed(ctx.event_bus.clone(), filter, replay);

    let stream = async_stream::stream! {
        let mut feed = pin!(feed);
        let mut heartbeat = tokio::time::interval(HEARTBEAT);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Skip the interval's immediate first tick.
        heartbeat.tick().await;

        loop {
            tokio::select! {
                next = std::future::poll_fn(|cx| feed.as_mut().poll_next(cx)) => {
                    match next {
                        Some(event) => {
                            if let Some(frame) = render(&event) {
                                yield Ok(frame);
                            }
                        }
                        None => break,
                    }
                }
                _ = heartbeat.tick() => {
                    yield Ok(sse::Event::default().event("heartbeat").data("{}"));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(HEARTBEAT).text("ping"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cur_core::events::EventPayload;
    use cur_core::JobId;
    use std::pin::Pin;

    async fn next_event(feed: &mut Pin<&mut impl Stream<Item = Event>>) -> Event {
        let item = tokio::time::timeout(
            Duration::from_secs(1),
            std::future::poll_fn(|cx| feed.as_mut().poll_next(cx)),
        )
        .await
        .unwrap();
        item.unwrap()
    }

    #[test]
    fn filter_parses_known_audiences_only() {
        assert_eq!(parse_filter(Some("admin")), Some(EventCategory::Admin));
        assert_eq!(parse_filter(Some("user")), Some(EventCategory::User));
        assert_eq!(parse_filter(Some("everything")), None);
        assert_eq!(parse_filter(None), None);
    }

    #[tokio::test]
    async fn replay_is_chronological_then_live() {
        let bus = Arc::new(EventBus::new(16));
        let first = JobId::new();
        let second = JobId::new();
        bus.broadcast(EventCategory::Admin, EventPayload::JobStarted { job_id: first });
        bus.broadcast(EventCategory::Admin, EventPayload::JobCompleted { job_id: first });

        let feed = event_feed(bus.clone(), None, 50);
        let mut feed = pin!(feed);

        assert!(matches!(
            next_event(&mut feed).await.payload,
            EventPayload::JobStarted { job_id } if job_id == first
        ));
        assert!(matches!(
            next_event(&mut feed).await.payload,
            EventPayload::JobCompleted { job_id } if job_id == first
        ));

        bus.broadcast(EventCategory::Admin, EventPayload::JobStarted { job_id: second });
        assert!(matches!(
            next_event(&mut feed).await.payload,
            EventPayload::JobStarted { job_id } if job_id == second
        ));
    }

    #[tokio::test]
    async fn category_filter_narrows_replay_and_live() {
        let bus = Arc::new(EventBus::new(16));
        bus.broadcast(EventCategory::Admin, EventPayload::SchedulerPaused);
        bus.broadcast(
            EventCategory::User,
            EventPayload::CompletenessUpdated {
                item_id: cur_core::ItemId::new(),
                percentage: 75.0,
                missing: 3,
            },
        );

        let feed = event_feed(bus.clone(), Some(EventCategory::User), 50);
        let mut feed = pin!(feed);

        let replayed = next_event(&mut feed).await;
        assert_eq!(replayed.category, EventCategory::User);

        bus.broadcast(EventCategory::Admin, EventPayload::SchedulerResumed);
        bus.broadcast(EventCategory::User, EventPayload::QualityScored {
            item_id: cur_core::ItemId::new(),
            tier_quality: "high".into(),
            needs_upgrade: false,
        });
        let live = next_event(&mut feed).await;
        assert!(matches!(live.payload, EventPayload::QualityScored { .. }));
    }

    #[tokio::test]
    async fn replay_budget_caps_backlog() {
        let bus = Arc::new(EventBus::new(64));
        let job_id = JobId::new();
        for _ in 0..10 {
            bus.broadcast(EventCategory::Admin, EventPayload::JobCompleted { job_id });
        }
        bus.broadcast(EventCategory::Admin, EventPayload::SchedulerPaused);

        // Budget of 2 keeps the two newest events, still oldest-first.
        let feed = event_feed(bus.clone(), None, 2);
        let mut feed = pin!(feed);
        assert!(matches!(
            next_event(&mut feed).await.payload,
            EventPayload::JobCompleted { .. }
        ));
        assert!(matches!(
            next_event(&mut feed).await.payload,
            EventPayload::SchedulerPaused
        ));
    }

    #[test]
    fn events_render_with_audience_name() {
        let event = Event::new(
            EventCategory::Admin,
            EventPayload::JobStarted { job_id: JobId::new() },
        );
        assert!(render(&event).is_some());
    }
}
