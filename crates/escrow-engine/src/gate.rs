//! Role gate
//!
//! One flat predicate decides every authorization question. It reads only the
//! agreement it is given.

use escrow_types::{Agreement, PartyId, Role};

/// Whether `caller` holds `required` on `agreement`
pub fn authorize(agreement: &Agreement, caller: &PartyId, required: Role) -> bool {
    match required {
        Role::Buyer => caller == &agreement.buyer,
        Role::Seller => caller == &agreement.seller,
        Role::Arbitrator => caller == &agreement.arbitrator,
        Role::BuyerOrSeller => caller == &agreement.buyer || caller == &agreement.seller,
    }
}
