use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

/// In-memory site data. Mutated only through `apply`, so replay and live
/// writes go through the same code.
pub struct SiteState {
    settings: DashMap<SettingKey, String>,
    booking_requests: DashMap<Ulid, BookingRequest>,
    contacts: DashMap<Ulid, ContactSubmission>,
    questions: DashMap<Ulid, UserQuestion>,
    reviews: DashMap<Ulid, Review>,
}

impl Default for SiteState {
    fn default() -> Self {
        Self::new()
    }
}

/// Clone every value out of `map`, newest id first.
fn newest_first<V: Clone>(map: &DashMap<Ulid, V>) -> Vec<V> {
    let mut rows: Vec<(Ulid, V)> = map.iter().map(|e| (*e.key(), e.value().clone())).collect();
    rows.sort_by(|a, b| b.0.cmp(&a.0));
    rows.into_iter().map(|(_, v)| v).collect()
}

fn oldest_first<V: Clone>(map: &DashMap<Ulid, V>) -> Vec<V> {
    let mut rows = newest_first(map);
    rows.reverse();
    rows
}

impl SiteState {
    pub fn new() -> Self {
        Self {
            settings: DashMap::new(),
            booking_requests: DashMap::new(),
            contacts: DashMap::new(),
            questions: DashMap::new(),
            reviews: DashMap::new(),
        }
    }

    pub fn apply(&self, event: &Event) {
        match event {
            Event::SettingUpdated { key, value } => {
                self.settings.insert(*key, value.clone());
            }
            Event::BookingRequested(r) => {
                self.booking_requests.insert(r.id, r.clone());
            }
            Event::BookingRequestDeleted { id } => {
                self.booking_requests.remove(id);
            }
            Event::ContactSubmitted(c) => {
                self.contacts.insert(c.id, c.clone());
            }
            Event::ContactDeleted { id } => {
                self.contacts.remove(id);
            }
            Event::QuestionSubmitted(q) => {
                self.questions.insert(q.id, q.clone());
            }
            Event::QuestionDeleted { id } => {
                self.questions.remove(id);
            }
            Event::ReviewSubmitted(r) => {
                self.reviews.insert(r.id, r.clone());
            }
            Event::ReviewApproved { id } => {
                if let Some(mut r) = self.reviews.get_mut(id) {
                    r.approved = true;
                }
            }
            Event::ReviewDeleted { id } => {
                self.reviews.remove(id);
            }
        }
    }

    // ── Settings ─────────────────────────────────────────────

    /// Stored JSON text for `key`, if it was ever written.
    pub fn setting_json(&self, key: SettingKey) -> Option<String> {
        self.settings.get(&key).map(|e| e.value().clone())
    }

    // ── Request tables ───────────────────────────────────────

    pub fn booking_request_count(&self) -> usize {
        self.booking_requests.len()
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn review_count(&self) -> usize {
        self.reviews.len()
    }

    pub fn has_booking_request(&self, id: &Ulid) -> bool {
        self.booking_requests.contains_key(id)
    }

    pub fn has_contact(&self, id: &Ulid) -> bool {
        self.contacts.contains_key(id)
    }

    pub fn has_question(&self, id: &Ulid) -> bool {
        self.questions.contains_key(id)
    }

    pub fn review(&self, id: &Ulid) -> Option<Review> {
        self.reviews.get(id).map(|e| e.value().clone())
    }

    pub fn booking_requests(&self) -> Vec<BookingRequest> {
        newest_first(&self.booking_requests)
    }

    pub fn contacts(&self) -> Vec<ContactSubmission> {
        newest_first(&self.contacts)
    }

    pub fn questions(&self) -> Vec<UserQuestion> {
        newest_first(&self.questions)
    }

    pub fn reviews(&self) -> Vec<Review> {
        newest_first(&self.reviews)
    }

    /// Minimal event list that rebuilds the current state. Approval travels
    /// inside the review record.
    pub fn snapshot_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        for key in SettingKey::ALL {
            if let Some(value) = self.setting_json(key) {
                events.push(Event::SettingUpdated { key, value });
            }
        }
        events.extend(oldest_first(&self.booking_requests).into_iter().map(Event::BookingRequested));
        events.extend(oldest_first(&self.contacts).into_iter().map(Event::ContactSubmitted));
        events.extend(oldest_first(&self.questions).into_iter().map(Event::QuestionSubmitted));
        events.extend(oldest_first(&self.reviews).into_iter().map(Event::ReviewSubmitted));
        events
    }
}
