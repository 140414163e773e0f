//! Status transitions for agreements and pushed documents.
//!
//! Every operation validates its input first, then applies date-based expiry,
//! then checks that the action is legal in the resulting status. A rejected
//! operation leaves the record untouched apart from the expiry refresh, which
//! only reflects the effective status the record already had.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::LifecycleError;
use crate::models::{
    Agreement, AgreementStatus, ClientSignature, DocumentStatus, ExtensionRecord,
    ExtensionRequest, ExtensionRequestStatus, PushedDocument, ReviewDecision,
};

impl Agreement {
    /// Moves a lapsed agreement to `Expired`. Returns true when it changed.
    pub fn refresh_expiry(&mut self, today: NaiveDate) -> bool {
        if self.status.can_expire() && self.expiry_date < today {
            self.status = AgreementStatus::Expired;
            return true;
        }
        false
    }

    /// Status as of `today`, without mutating the record.
    pub fn effective_status(&self, today: NaiveDate) -> AgreementStatus {
        if self.status.can_expire() && self.expiry_date < today {
            AgreementStatus::Expired
        } else {
            self.status
        }
    }

    /// First read by the client. A no-op unless the agreement is pending.
    pub fn mark_viewed(&mut self, now: DateTime<Utc>) -> bool {
        self.refresh_expiry(now.date_naive());
        if self.status != AgreementStatus::Pending {
            return false;
        }

        self.status = AgreementStatus::Viewed;
        self.viewed_at = Some(now);
        self.updated_at = now;
        true
    }

    pub fn sign(
        &mut self,
        signer_name: &str,
        ip_address: &str,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        let signer_name = signer_name.trim();
        if signer_name.is_empty() {
            return Err(LifecycleError::validation("signer name is required"));
        }

        self.refresh_expiry(now.date_naive());
        if !matches!(
            self.status,
            AgreementStatus::Pending | AgreementStatus::Viewed
        ) {
            return Err(LifecycleError::illegal("sign", self.status));
        }

        let ip_address = ip_address.trim();
        self.status = AgreementStatus::Signed;
        self.client_signature = Some(ClientSignature {
            name: signer_name.to_string(),
            signed_at: now,
            ip_address: if ip_address.is_empty() {
                "unknown".to_string()
            } else {
                ip_address.to_string()
            },
        });
        self.updated_at = now;
        Ok(())
    }

    pub fn reject(&mut self, reason: &str, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LifecycleError::validation("rejection reason is required"));
        }

        self.refresh_expiry(now.date_naive());
        if !matches!(
            self.status,
            AgreementStatus::Pending | AgreementStatus::Viewed
        ) {
            return Err(LifecycleError::illegal("reject", self.status));
        }

        self.status = AgreementStatus::Rejected;
        self.rejection_reason = Some(reason.to_string());
        self.updated_at = now;
        Ok(())
    }

    /// Client asks to move the expiry date forward. Only an expired agreement
    /// without an open request qualifies; `status` is left as it is.
    pub fn request_extension(
        &mut self,
        requested_expiry_date: Option<NaiveDate>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        let Some(requested_expiry_date) = requested_expiry_date else {
            return Err(LifecycleError::validation(
                "requested expiry date is required",
            ));
        };

        let today = now.date_naive();
        self.refresh_expiry(today);
        if self.status != AgreementStatus::Expired {
            return Err(LifecycleError::illegal("request an extension", self.status));
        }
        if self
            .extension_request
            .as_ref()
            .is_some_and(|request| request.status == ExtensionRequestStatus::Pending)
        {
            return Err(LifecycleError::illegal(
                "request an extension",
                "an extension request is pending",
            ));
        }
        if requested_expiry_date <= self.expiry_date {
            return Err(LifecycleError::validation(
                "requested expiry date must be after the current expiry date",
            ));
        }
        if requested_expiry_date < today {
            return Err(LifecycleError::validation(
                "requested expiry date must not be in the past",
            ));
        }

        self.extension_request = Some(ExtensionRequest {
            requested: true,
            requested_expiry_date,
            reason: reason.trim().to_string(),
            status: ExtensionRequestStatus::Pending,
            requested_at: now,
            reviewed_at: None,
            reviewed_by: None,
        });
        self.updated_at = now;
        Ok(())
    }

    /// Admin decision on the open extension request.
    ///
    /// Approval appends one extension record, moves the expiry date and
    /// re-opens the agreement if the new date has not already passed: it
    /// returns to `Signed` when a signature exists, to `Viewed` when the
    /// client had opened it, and to `Pending` otherwise.
    pub fn review_extension(
        &mut self,
        decision: ReviewDecision,
        reviewer: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        self.refresh_expiry(now.date_naive());
        let Some(request) = self.extension_request.as_mut() else {
            return Err(LifecycleError::illegal(
                "review an extension",
                "no extension was requested",
            ));
        };
        if request.status != ExtensionRequestStatus::Pending {
            return Err(LifecycleError::illegal(
                "review an extension",
                format!("the request is already {}", request.status.as_str()),
            ));
        }

        request.reviewed_at = Some(now);
        request.reviewed_by = Some(reviewer);

        match decision {
            ReviewDecision::Rejected => {
                request.status = ExtensionRequestStatus::Rejected;
            }
            ReviewDecision::Approved => {
                request.status = ExtensionRequestStatus::Approved;
                let new_expiry_date = request.requested_expiry_date;
                let reason = request.reason.clone();

                self.extensions.push(ExtensionRecord {
                    old_expiry_date: self.expiry_date,
                    new_expiry_date,
                    extended_at: now,
                    reason,
                });
                self.expiry_date = new_expiry_date;

                if self.status == AgreementStatus::Expired && new_expiry_date >= now.date_naive() {
                    self.status = if self.client_signature.is_some() {
                        AgreementStatus::Signed
                    } else if self.viewed_at.is_some() {
                        AgreementStatus::Viewed
                    } else {
                        AgreementStatus::Pending
                    };
                }
            }
        }

        self.updated_at = now;
        Ok(())
    }
}

impl PushedDocument {
    pub fn review(
        &mut self,
        decision: ReviewDecision,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        let note = note.map(str::trim).filter(|note| !note.is_empty());
        if decision == ReviewDecision::Rejected && note.is_none() {
            return Err(LifecycleError::validation(
                "a note is required when rejecting a document",
            ));
        }
        if self.status != DocumentStatus::Pending {
            return Err(LifecycleError::illegal(
                "review a document",
                format!("it is {}", self.status.as_str()),
            ));
        }

        self.status = match decision {
            ReviewDecision::Approved => DocumentStatus::Approved,
            ReviewDecision::Rejected => DocumentStatus::Rejected,
        };
        self.review_note = note.map(str::to_string);
        self.reviewed_at = Some(now);
        Ok(())
    }
}
