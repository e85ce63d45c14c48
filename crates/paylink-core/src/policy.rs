//! Minimum key level per call
//!
//! This table is the only place that decides how strong a proof of
//! possession a call needs. Clients start their key search at
//! `max(context minimum, required_level(method))`; the gateway rejects a
//! call signed below `required_level(method)`.
//!
//! Token endorsement is listed at LOW: the endorsement signature's own level
//! decides whether the token reaches ENDORSED, so a LOW endorsement is
//! accepted and leaves the token PARTIALLY_ENDORSED.

use crate::rpc::Method;
use crate::types::KeyLevel;

pub fn required_level(method: Method) -> KeyLevel {
    match method {
        Method::CreateMember
        | Method::UpdateMember
        | Method::DeleteMember
        | Method::CompleteRecovery => KeyLevel::Privileged,

        Method::UnlinkAccounts => KeyLevel::Standard,

        Method::GetMember
        | Method::CreateToken
        | Method::GetToken
        | Method::GetTokens
        | Method::EndorseToken
        | Method::CancelToken
        | Method::ReplaceToken
        | Method::CreateTransfer
        | Method::GetTransfer
        | Method::GetTransfers
        | Method::GetAccounts
        | Method::GetBalance
        | Method::GetTransactions
        | Method::ResolveTransferDestinations
        | Method::ConfirmFunds => KeyLevel::Low,

        // Not signed with call metadata
        Method::ResolveAlias
        | Method::CreateMemberId
        | Method::BeginRecovery
        | Method::GetRecoveryAuthorization => KeyLevel::Low,
    }
}
