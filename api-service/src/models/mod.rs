//! Domain records persisted by the store.

pub mod identity;
pub mod invitation;
pub mod membership;
pub mod organization;
pub mod user;

pub use identity::Identity;
pub use invitation::{Invitation, InvitationStatus, INVITATION_TTL_DAYS};
pub use membership::{Membership, Role};
pub use organization::{Organization, SubscriptionSnapshot};
pub use user::{User, UserRole, EMAIL_VERIFICATION_TTL_HOURS};

use rand::RngCore;

/// 32 random bytes, hex encoded. Used for tokens delivered by email.
pub(crate) fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
