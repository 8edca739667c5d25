//! User identity and session lifecycle.
//!
//! [`Identity`] is plain state owned by the worker lane. Each transition
//! returns an [`Outcome`] listing the events it produced and the side effects
//! the lane has to carry out (persisting the user, aliasing, refreshing
//! values). Nothing here touches storage or the network.

use crate::attributes::Attributes;
use crate::clock::UniqueClock;
use crate::event::{Event, END_SESSION, PAUSE_SESSION, RESUME_SESSION, START_SESSION};
use crate::session::Session;
use crate::user::{new_identifier, User};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, warn};

/// An event bound to the user and session it happened in.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TrackedEvent {
    pub user: User,
    pub session: Session,
    pub event: Event,
}

/// Link from an anonymous id to the id the user was identified with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Alias {
    pub previous_id: String,
    pub new_id: String,
}

/// What a transition asks the lane to do.
#[derive(Debug, Default)]
pub(crate) struct Outcome {
    pub events: Vec<TrackedEvent>,
    pub alias: Option<Alias>,
    pub user_changed: bool,
    pub refresh_values: bool,
}

#[derive(Debug)]
pub(crate) struct Identity {
    user: Option<User>,
    session: Option<Session>,
    background_at: Option<DateTime<Utc>>,
    session_timeout: Duration,
}

impl Identity {
    pub(crate) fn new(session_timeout: Duration) -> Self {
        Self {
            user: None,
            session: None,
            background_at: None,
            session_timeout,
        }
    }

    pub(crate) fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub(crate) fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Adopt the persisted user, or a new anonymous one, and open the first
    /// session.
    pub(crate) fn restore(&mut self, persisted: Option<User>, clock: &UniqueClock) -> Outcome {
        let user = persisted.unwrap_or_else(User::anonymous);
        info!(user_id = %user.identifier(), identified = user.is_identified(), "restoring user");
        let identified = user.is_identified();
        let (id, attributes) = (user.identifier().to_string(), user.attributes().clone());
        self.identify(id, attributes, identified, false, clock)
    }

    /// Switch to user `id`, or update the current user if `id` is theirs.
    pub(crate) fn identify(
        &mut self,
        id: String,
        attributes: Attributes,
        identified: bool,
        want_alias: bool,
        clock: &UniqueClock,
    ) -> Outcome {
        let mut outcome = Outcome::default();

        if let Some(current) = self.user.as_mut() {
            if current.identifier() == id {
                debug!(user_id = %id, "same user, merging attributes");
                current.merge_attributes(attributes);
                outcome.user_changed = true;
                return outcome;
            }
        }

        if let Some(ended) = self.end_session(clock.now()) {
            outcome.events.push(ended);
        }

        let previous = self.user.take();
        self.user = Some(User::new(id.clone(), attributes, identified));
        outcome.events.push(self.start_session(clock.now()));

        if want_alias {
            match &previous {
                Some(p) if !p.is_identified() => {
                    outcome.alias = Some(Alias {
                        previous_id: p.identifier().to_string(),
                        new_id: id.clone(),
                    });
                }
                Some(p) => {
                    warn!(
                        previous = %p.identifier(),
                        new = %id,
                        "not aliasing an already identified user"
                    );
                }
                None => {}
            }
        }

        info!(user_id = %id, identified, "user identified");
        outcome.user_changed = true;
        outcome.refresh_values = true;
        outcome
    }

    /// Forget the session without ending it, reset the user and open a
    /// fresh session.
    pub(crate) fn reset(&mut self, clock: &UniqueClock) -> Outcome {
        self.session = None;
        self.background_at = None;
        let mut outcome = self.reset_user(clock);
        let started = self.ensure_session(clock);
        outcome.events.extend(started.events);
        outcome.user_changed |= started.user_changed;
        outcome
    }

    /// Identified users are replaced by a new anonymous user. Anonymous
    /// users keep their id and lose their attributes.
    pub(crate) fn reset_user(&mut self, clock: &UniqueClock) -> Outcome {
        match self.user.as_mut() {
            Some(user) if !user.is_identified() => {
                debug!(user_id = %user.identifier(), "clearing anonymous user attributes");
                user.clear_custom_attributes();
                Outcome {
                    user_changed: true,
                    ..Default::default()
                }
            }
            _ => self.identify(new_identifier(), Attributes::new(), false, false, clock),
        }
    }

    pub(crate) fn set_attributes(&mut self, attributes: Attributes, clock: &UniqueClock) -> Outcome {
        let mut outcome = self.ensure_session(clock);
        if let Some(user) = self.user.as_mut() {
            user.merge_attributes(attributes);
        }
        outcome.user_changed = true;
        outcome
    }

    /// Record a host event, creating a user or session first if missing.
    pub(crate) fn track(&mut self, name: String, attributes: Attributes, clock: &UniqueClock) -> Outcome {
        let mut outcome = self.ensure_session(clock);
        let event = Event::new(name, attributes, clock.now());
        if let Some(tracked) = self.bind(event) {
            outcome.events.push(tracked);
        }
        outcome
    }

    pub(crate) fn backgrounded(&mut self, clock: &UniqueClock) -> Outcome {
        let mut outcome = Outcome::default();
        let now = clock.now();
        if let Some(tracked) = self.bind(Event::system(PAUSE_SESSION, now)) {
            outcome.events.push(tracked);
        }
        self.background_at = Some(now);
        outcome.refresh_values = true;
        outcome
    }

    /// Resume the session, or replace it if the app stayed in background for
    /// at least the session timeout. The replaced session ends at the moment
    /// the app went to background.
    pub(crate) fn foregrounded(&mut self, clock: &UniqueClock) -> Outcome {
        let mut outcome = Outcome::default();
        let now = clock.now();
        let background_at = self.background_at.take();
        let has_session = self.session.as_ref().is_some_and(Session::is_open);

        match background_at {
            Some(at) if has_session => {
                let away = now.signed_duration_since(at).to_std().unwrap_or_default();
                if away >= self.session_timeout {
                    info!(away = ?away, "session timed out in background");
                    if let Some(ended) = self.end_session(at) {
                        outcome.events.push(ended);
                    }
                    outcome.events.push(self.start_session(now));
                } else if let Some(tracked) = self.bind(Event::system(RESUME_SESSION, now)) {
                    outcome.events.push(tracked);
                }
            }
            _ => {
                outcome = self.ensure_session(clock);
            }
        }
        outcome
    }

    /// End the open session and start a new one.
    pub(crate) fn close_session(&mut self, clock: &UniqueClock) -> Outcome {
        let mut outcome = self.ensure_user();
        if let Some(ended) = self.end_session(clock.now()) {
            outcome.events.push(ended);
        }
        outcome.events.push(self.start_session(clock.now()));
        outcome
    }

    fn ensure_user(&mut self) -> Outcome {
        let mut outcome = Outcome::default();
        if self.user.is_none() {
            let user = User::anonymous();
            debug!(user_id = %user.identifier(), "creating anonymous user");
            self.user = Some(user);
            outcome.user_changed = true;
        }
        outcome
    }

    fn ensure_session(&mut self, clock: &UniqueClock) -> Outcome {
        let mut outcome = self.ensure_user();
        if !self.session.as_ref().is_some_and(Session::is_open) {
            outcome.events.push(self.start_session(clock.now()));
        }
        outcome
    }

    fn start_session(&mut self, at: DateTime<Utc>) -> TrackedEvent {
        let session = Session::open(at, self.session_timeout);
        debug!(session_id = %session.id(), "session started");
        self.session = Some(session.clone());
        TrackedEvent {
            user: self.user.clone().unwrap_or_else(User::anonymous),
            session,
            event: Event::system(START_SESSION, at),
        }
    }

    fn end_session(&mut self, at: DateTime<Utc>) -> Option<TrackedEvent> {
        let mut session = self.session.take().filter(Session::is_open)?;
        let user = self.user.clone()?;
        session.close(at);
        debug!(session_id = %session.id(), "session ended");
        Some(TrackedEvent {
            user,
            session,
            event: Event::system(END_SESSION, at),
        })
    }

    fn bind(&self, event: Event) -> Option<TrackedEvent> {
        Some(TrackedEvent {
            user: self.user.clone()?,
            session: self.session.clone().filter(Session::is_open)?,
            event,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::AttributeValue;

    fn names(outcome: &Outcome) -> Vec<&str> {
        outcome.events.iter().map(|t| t.event.name()).collect()
    }

    fn started(clock: &UniqueClock) -> Identity {
        let mut identity = Identity::new(Duration::from_secs(30));
        identity.restore(None, clock);
        identity
    }

    fn session_id(identity: &Identity) -> String {
        identity.session().unwrap().id().to_string()
    }

    #[test]
    fn test_restore_opens_first_session() {
        let clock = UniqueClock::new();
        let mut identity = Identity::new(Duration::from_secs(30));

        let outcome = identity.restore(None, &clock);

        assert_eq!(names(&outcome), vec![START_SESSION]);
        assert!(outcome.alias.is_none());
        assert!(!identity.user().unwrap().is_identified());
        assert!(identity.session().unwrap().is_open());
    }

    #[test]
    fn test_restore_keeps_persisted_user() {
        let clock = UniqueClock::new();
        let mut identity = Identity::new(Duration::from_secs(30));
        let persisted = User::new("u1", Attributes::from([("k".into(), 1.into())]), true);

        identity.restore(Some(persisted.clone()), &clock);

        assert_eq!(identity.user(), Some(&persisted));
    }

    #[test]
    fn test_identify_same_id_merges_without_new_session() {
        let clock = UniqueClock::new();
        let mut identity = started(&clock);
        identity.identify("A".into(), Attributes::new(), true, true, &clock);
        let before = session_id(&identity);

        let outcome = identity.identify(
            "A".into(),
            Attributes::from([("k".into(), 1.into())]),
            true,
            true,
            &clock,
        );

        assert!(outcome.events.is_empty());
        assert!(outcome.alias.is_none());
        assert!(!outcome.refresh_values);
        assert_eq!(session_id(&identity), before);
        assert_eq!(
            identity.user().unwrap().attribute("k"),
            Some(&AttributeValue::from(1))
        );
    }

    #[test]
    fn test_identify_new_id_cycles_session_and_aliases_anonymous() {
        let clock = UniqueClock::new();
        let mut identity = started(&clock);
        let anonymous_id = identity.user().unwrap().identifier().to_string();
        let before = session_id(&identity);

        let outcome = identity.identify("A".into(), Attributes::new(), true, true, &clock);

        assert_eq!(names(&outcome), vec![END_SESSION, START_SESSION]);
        assert_eq!(outcome.events[0].session.id(), before);
        assert!(!outcome.events[0].session.is_open());
        assert_eq!(outcome.events[0].user.identifier(), anonymous_id);
        assert_eq!(outcome.events[1].user.identifier(), "A");
        assert_ne!(session_id(&identity), before);
        assert_eq!(
            outcome.alias,
            Some(Alias {
                previous_id: anonymous_id.clone(),
                new_id: "A".into()
            })
        );
        assert!(outcome.refresh_values);
    }

    #[test]
    fn test_identify_does_not_alias_identified_user() {
        let clock = UniqueClock::new();
        let mut identity = started(&clock);
        identity.identify("A".into(), Attributes::new(), true, true, &clock);

        let outcome = identity.identify("B".into(), Attributes::new(), true, true, &clock);

        assert_eq!(names(&outcome), vec![END_SESSION, START_SESSION]);
        assert!(outcome.alias.is_none());
    }

    #[test]
    fn test_identify_without_alias_request() {
        let clock = UniqueClock::new();
        let mut identity = started(&clock);

        let outcome = identity.identify("A".into(), Attributes::new(), true, false, &clock);

        assert!(outcome.alias.is_none());
    }

    #[test]
    fn test_reset_identified_user_becomes_anonymous() {
        let clock = UniqueClock::new();
        let mut identity = started(&clock);
        identity.identify("A".into(), Attributes::new(), true, true, &clock);

        let outcome = identity.reset_user(&clock);

        let user = identity.user().unwrap();
        assert_ne!(user.identifier(), "A");
        assert!(!user.is_identified());
        assert!(outcome.alias.is_none());
        assert_eq!(names(&outcome), vec![END_SESSION, START_SESSION]);
    }

    #[test]
    fn test_reset_anonymous_user_keeps_id() {
        let clock = UniqueClock::new();
        let mut identity = started(&clock);
        identity.set_attributes(Attributes::from([("plan".into(), "pro".into())]), &clock);
        let id = identity.user().unwrap().identifier().to_string();
        let session = session_id(&identity);

        let outcome = identity.reset_user(&clock);

        let user = identity.user().unwrap();
        assert_eq!(user.identifier(), id);
        assert!(user.attributes().is_empty());
        assert!(outcome.events.is_empty());
        assert_eq!(session_id(&identity), session);
    }

    #[test]
    fn test_reset_replaces_session_silently() {
        let clock = UniqueClock::new();
        let mut identity = started(&clock);
        identity.identify("A".into(), Attributes::new(), true, true, &clock);
        let session = session_id(&identity);

        let outcome = identity.reset(&clock);

        assert_eq!(names(&outcome), vec![START_SESSION]);
        assert_ne!(session_id(&identity), session);
        assert!(!identity.user().unwrap().is_identified());
    }

    #[test]
    fn test_reset_keeps_anonymous_id_and_opens_session() {
        let clock = UniqueClock::new();
        let mut identity = started(&clock);
        let id = identity.user().unwrap().identifier().to_string();
        identity.backgrounded(&clock);

        let outcome = identity.reset(&clock);

        assert_eq!(names(&outcome), vec![START_SESSION]);
        assert_eq!(identity.user().unwrap().identifier(), id);
        // the background mark went with the old session
        let resumed = identity.foregrounded(&clock);
        assert!(resumed.events.is_empty());
    }

    #[test]
    fn test_track_synthesizes_user_and_session() {
        let clock = UniqueClock::new();
        let mut identity = Identity::new(Duration::from_secs(30));

        let outcome = identity.track("signup".into(), Attributes::new(), &clock);

        assert_eq!(names(&outcome), vec![START_SESSION, "signup"]);
        assert!(outcome.user_changed);
        assert_eq!(outcome.events[0].session, outcome.events[1].session);
    }

    #[test]
    fn test_track_within_session() {
        let clock = UniqueClock::new();
        let mut identity = started(&clock);

        let outcome = identity.track("tap".into(), Attributes::new(), &clock);

        assert_eq!(names(&outcome), vec!["tap"]);
        assert_eq!(outcome.events[0].session.id(), session_id(&identity));
    }

    #[test]
    fn test_quick_foreground_resumes_session() {
        let clock = UniqueClock::new();
        let mut identity = started(&clock);
        let before = session_id(&identity);

        let paused = identity.backgrounded(&clock);
        clock.advance(Duration::from_secs(5));
        let resumed = identity.foregrounded(&clock);

        assert_eq!(names(&paused), vec![PAUSE_SESSION]);
        assert!(paused.refresh_values);
        assert_eq!(names(&resumed), vec![RESUME_SESSION]);
        assert_eq!(session_id(&identity), before);
    }

    #[test]
    fn test_foreground_after_timeout_starts_new_session() {
        let clock = UniqueClock::new();
        let mut identity = started(&clock);
        let before = session_id(&identity);

        identity.backgrounded(&clock);
        let background_at = identity.background_at.unwrap();
        clock.advance(Duration::from_secs(30));
        let outcome = identity.foregrounded(&clock);

        assert_eq!(names(&outcome), vec![END_SESSION, START_SESSION]);
        let ended = &outcome.events[0].session;
        assert_eq!(ended.id(), before);
        assert_eq!(ended.ended_at(), Some(background_at));
        assert_ne!(session_id(&identity), before);
    }

    #[test]
    fn test_foreground_without_background_is_quiet() {
        let clock = UniqueClock::new();
        let mut identity = started(&clock);

        let outcome = identity.foregrounded(&clock);

        assert!(outcome.events.is_empty());
    }

    #[test]
    fn test_close_session() {
        let clock = UniqueClock::new();
        let mut identity = started(&clock);
        let before = session_id(&identity);

        let outcome = identity.close_session(&clock);

        assert_eq!(names(&outcome), vec![END_SESSION, START_SESSION]);
        assert!(outcome.events[0].event.occurred_at() < outcome.events[1].event.occurred_at());
        assert_ne!(session_id(&identity), before);
    }

    #[test]
    fn test_at_most_one_open_session() {
        let clock = UniqueClock::new();
        let mut identity = started(&clock);

        for id in ["A", "B", "C"] {
            let outcome = identity.identify(id.into(), Attributes::new(), true, true, &clock);
            let open = outcome.events.iter().filter(|t| t.session.is_open()).count();
            assert_eq!(open, 1);
        }
    }
}
