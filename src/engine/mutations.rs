use tokio::sync::oneshot;
use tracing::{debug, info};
use ulid::Ulid;

use crate::calendar::OverrideTable;
use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError, WalCommand};

/// Trimmed value of a required text field.
fn required(field: &str, value: &str, max_len: usize) -> Result<String, EngineError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EngineError::Invalid(format!("{field} is required")));
    }
    if value.len() > max_len {
        return Err(EngineError::LimitExceeded("field too long"));
    }
    Ok(value.to_string())
}

fn room_for(count: usize) -> Result<(), EngineError> {
    if count >= MAX_RECORDS_PER_TABLE {
        return Err(EngineError::LimitExceeded("too many records in table"));
    }
    Ok(())
}

/// Check `value` has the shape `key` stores and return it in stored form.
/// The override table is pruned of empty entries on the way in.
fn normalize_setting(key: SettingKey, value: serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let invalid = |what: &str| EngineError::Invalid(format!("{key} must be {what}"));
    match key {
        SettingKey::DateInfo => OverrideTable::from_json(&value)
            .map(|t| t.to_json())
            .map_err(EngineError::Invalid),
        SettingKey::HighSeasonRate | SettingKey::LowSeasonRate => value
            .as_u64()
            .and_then(|n| Price::try_from(n).ok())
            .map(serde_json::Value::from)
            .ok_or_else(|| invalid("a non-negative whole number")),
        SettingKey::IsQuizEnabled if value.is_boolean() => Ok(value),
        SettingKey::IsQuizEnabled => Err(invalid("true or false")),
        SettingKey::HeroImage if value.is_string() => Ok(value),
        SettingKey::HeroImage => Err(invalid("a string")),
        SettingKey::GalleryImages if value.is_array() => Ok(value),
        SettingKey::GalleryImages => Err(invalid("an array")),
        SettingKey::SiteContent if value.is_object() => Ok(value),
        SettingKey::SiteContent => Err(invalid("an object")),
    }
}

impl Engine {
    /// Replace the whole value under `key`. No merge with what is stored.
    pub async fn update_setting(
        &self,
        key: SettingKey,
        value: serde_json::Value,
    ) -> Result<(), EngineError> {
        let value = normalize_setting(key, value)?;
        let text = value.to_string();
        if text.len() > MAX_SETTING_VALUE_LEN {
            return Err(EngineError::LimitExceeded("setting value too large"));
        }
        self.persist_and_apply(Event::SettingUpdated { key, value: text }, |_| Ok(()))
            .await?;
        debug!("setting {key} updated");
        Ok(())
    }

    pub async fn submit_booking_request(
        &self,
        request: NewBookingRequest,
    ) -> Result<BookingRequest, EngineError> {
        let name = required("name", &request.name, MAX_NAME_LEN)?;
        let email = required("email", &request.email, MAX_EMAIL_LEN)?;
        let nights = request.check_in.days_until(&request.check_out);
        if nights <= 0 {
            return Err(EngineError::Invalid("check_out must be after check_in".into()));
        }
        if nights > MAX_STAY_NIGHTS {
            return Err(EngineError::LimitExceeded("stay too long"));
        }
        if nights != request.nights as i64 {
            return Err(EngineError::Invalid(format!(
                "nights is {} but the dates span {nights}",
                request.nights
            )));
        }

        let record = BookingRequest {
            id: self.next_id(),
            name,
            email,
            check_in: request.check_in,
            check_out: request.check_out,
            nights: request.nights,
            total_price: request.total_price,
            submitted_at: now_ms(),
        };
        self.persist_and_apply(Event::BookingRequested(record.clone()), |s| {
            room_for(s.booking_request_count())
        })
        .await?;
        info!(
            "booking request {}: {} -> {}, {} nights, total {}",
            record.id, record.check_in, record.check_out, record.nights, record.total_price
        );
        Ok(record)
    }

    pub async fn delete_booking_request(&self, id: Ulid) -> Result<(), EngineError> {
        self.persist_and_apply(Event::BookingRequestDeleted { id }, |s| {
            s.has_booking_request(&id).then_some(()).ok_or(EngineError::NotFound(id))
        })
        .await
    }

    pub async fn submit_contact(
        &self,
        name: &str,
        email: &str,
        phone: Option<&str>,
        message: &str,
    ) -> Result<ContactSubmission, EngineError> {
        let phone = match phone.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) if p.len() > MAX_PHONE_LEN => {
                return Err(EngineError::LimitExceeded("field too long"));
            }
            other => other.map(str::to_string),
        };
        let record = ContactSubmission {
            id: self.next_id(),
            name: required("name", name, MAX_NAME_LEN)?,
            email: required("email", email, MAX_EMAIL_LEN)?,
            phone,
            message: required("message", message, MAX_MESSAGE_LEN)?,
            submitted_at: now_ms(),
        };
        self.persist_and_apply(Event::ContactSubmitted(record.clone()), |s| {
            room_for(s.contact_count())
        })
        .await?;
        Ok(record)
    }

    pub async fn delete_contact(&self, id: Ulid) -> Result<(), EngineError> {
        self.persist_and_apply(Event::ContactDeleted { id }, |s| {
            s.has_contact(&id).then_some(()).ok_or(EngineError::NotFound(id))
        })
        .await
    }

    pub async fn submit_question(&self, email: &str, question: &str) -> Result<UserQuestion, EngineError> {
        let record = UserQuestion {
            id: self.next_id(),
            email: required("email", email, MAX_EMAIL_LEN)?,
            question: required("question", question, MAX_MESSAGE_LEN)?,
            submitted_at: now_ms(),
        };
        self.persist_and_apply(Event::QuestionSubmitted(record.clone()), |s| {
            room_for(s.question_count())
        })
        .await?;
        Ok(record)
    }

    pub async fn delete_question(&self, id: Ulid) -> Result<(), EngineError> {
        self.persist_and_apply(Event::QuestionDeleted { id }, |s| {
            s.has_question(&id).then_some(()).ok_or(EngineError::NotFound(id))
        })
        .await
    }

    /// New reviews start unapproved and are hidden from guests.
    pub async fn submit_review(&self, name: &str, rating: u8, comment: &str) -> Result<Review, EngineError> {
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(EngineError::Invalid(format!(
                "rating must be between {MIN_RATING} and {MAX_RATING}"
            )));
        }
        let record = Review {
            id: self.next_id(),
            name: required("name", name, MAX_NAME_LEN)?,
            rating,
            comment: required("comment", comment, MAX_MESSAGE_LEN)?,
            submitted_at: now_ms(),
            approved: false,
        };
        self.persist_and_apply(Event::ReviewSubmitted(record.clone()), |s| {
            room_for(s.review_count())
        })
        .await?;
        Ok(record)
    }

    /// Approving an approved review is a no-op that still succeeds.
    pub async fn approve_review(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.write_gate.lock().await;
        let review = self.state.review(&id).ok_or(EngineError::NotFound(id))?;
        if review.approved {
            return Ok(());
        }
        let event = Event::ReviewApproved { id };
        self.wal_append(&event).await?;
        self.state.apply(&event);
        Ok(())
    }

    pub async fn delete_review(&self, id: Ulid) -> Result<(), EngineError> {
        self.persist_and_apply(Event::ReviewDeleted { id }, |s| {
            s.review(&id).map(|_| ()).ok_or(EngineError::NotFound(id))
        })
        .await
    }

    /// Rewrite the WAL as the minimal event list for the current state. Writes
    /// wait on the gate until the new log is in place.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.write_gate.lock().await;
        let events = self.state.snapshot_events();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
