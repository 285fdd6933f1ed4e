//! Out-of-band salesperson notifications.
//!
//! Drafted responses, auto-sent replies, and handoffs each notify the
//! assigned salesperson over the same messaging channel the customer used.
//! Notification failures are logged and never fail the customer flow.

use tracing::{info, warn};

use crate::providers::MessagingProvider;
use crate::types::{Lead, UserProfile};

/// Approval request sent to the salesperson when a draft needs review.
pub fn draft_notification(lead: &Lead, customer_message: &str, generated_response: &str) -> String {
    format!(
        "New customer message from {} ({}):\n\n\
         Customer: {customer_message}\n\n\
         Suggested reply:\n{generated_response}\n\n\
         Reply with:\n\
         - 'YES' to send this response\n\
         - 'NO' to reject it\n\
         - 'EDIT [instructions]' to have me improve it\n\
         - 'FORCE [your message]' to send your own message directly",
        lead.name,
        lead.phone.as_deref().unwrap_or("unknown"),
    )
}

/// Re-approval request after an EDIT regeneration.
pub fn edited_draft_notification(
    customer_message: &str,
    edit_instructions: &str,
    new_response: &str,
) -> String {
    format!(
        "Response edited and regenerated!\n\n\
         Customer: {customer_message}\n\n\
         Edit instructions: {edit_instructions}\n\n\
         New suggested reply: {new_response}\n\n\
         Reply with:\n\
         - 'YES' to send this response\n\
         - 'NO' to reject it\n\
         - 'EDIT [instructions]' to edit again\n\
         - 'FORCE [your message]' to send your custom message directly"
    )
}

/// Heads-up after an auto-sent reply.
pub fn auto_sent_notification(
    lead: &Lead,
    customer_message: &str,
    generated_response: &str,
) -> String {
    format!(
        "Customer interaction from {} ({}):\n\n\
         Customer: {customer_message}\n\n\
         Reply sent automatically: {generated_response}\n\n\
         The customer received an automatic response. You can follow up if needed.",
        lead.name,
        lead.phone.as_deref().unwrap_or("unknown"),
    )
}

/// Handoff alert naming the reason.
pub fn handoff_notification(lead: &Lead, customer_message: &str, reason: &str) -> String {
    format!(
        "Customer handoff needed for {} ({}). Reason: {reason}.\n\n\
         Customer message: {customer_message}",
        lead.name,
        lead.phone.as_deref().unwrap_or("unknown"),
    )
}

/// Deliver a notification to a salesperson, swallowing failures.
pub async fn send_to_salesperson(
    provider: &dyn MessagingProvider,
    profile: &UserProfile,
    text: &str,
) {
    let Some(phone) = profile.phone.as_deref() else {
        warn!(user_id = %profile.user_id, "assigned salesperson has no phone number");
        return;
    };
    match provider.send(phone, text).await {
        Ok(receipt) => info!(
            user_id = %profile.user_id,
            provider_message_id = %receipt.provider_message_id,
            "notified salesperson"
        ),
        Err(e) => warn!(user_id = %profile.user_id, error = %e, "salesperson notification failed"),
    }
}
