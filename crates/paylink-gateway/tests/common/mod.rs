//! Shared test harness: a gateway on a manual clock plus helpers that sign
//! calls the way a client would.

#![allow(dead_code)]

use paylink_core::{
    rpc::signing_payload, Account, Alias, CallMetadata, Envelope, KeyLevel, KeyPair, ManualClock,
    MemberOperation, MemberState, MemberType, MemberUpdate, Request, Resource, Response,
    Signature, Token, TokenPayload, TokenSignature, Action, SIGNATURE_SCHEME,
};
use paylink_gateway::{ApiError, AppState, GatewayConfig, RecordingNotifier};
use std::sync::Arc;

pub const START_MS: i64 = 1_700_000_000_000;
pub const CLIENT_VERSION: &str = "0.1.0";

pub struct TestMember {
    pub id: String,
    pub alias: Alias,
    pub low: KeyPair,
    pub standard: KeyPair,
    pub privileged: KeyPair,
}

impl TestMember {
    pub fn pair(&self, level: KeyLevel) -> &KeyPair {
        match level {
            KeyLevel::Low => &self.low,
            KeyLevel::Standard => &self.standard,
            KeyLevel::Privileged => &self.privileged,
        }
    }

    pub fn token_signature(&self, token_id: &str, action: Action, level: KeyLevel) -> TokenSignature {
        TokenSignature::create(token_id, action, &self.id, self.pair(level))
    }
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(GatewayConfig::default())
    }

    pub fn with_config(config: GatewayConfig) -> Self {
        let clock = Arc::new(ManualClock::new(START_MS));
        let notifier = Arc::new(RecordingNotifier::new());
        let state = AppState::new(config)
            .with_clock(clock.clone())
            .with_notifier(notifier.clone());
        Self {
            state: Arc::new(state),
            clock,
            notifier,
        }
    }

    pub fn now_ms(&self) -> i64 {
        paylink_core::Clock::now_ms(self.clock.as_ref())
    }

    pub async fn unauthenticated(&self, request: Request) -> Result<Response, ApiError> {
        self.state
            .handle(Envelope {
                request,
                auth: None,
                client_version: CLIENT_VERSION.into(),
                trace_id: "test".into(),
            })
            .await
    }

    pub fn envelope(
        &self,
        member_id: &str,
        pair: &KeyPair,
        on_behalf_of: Option<&str>,
        request: Request,
        created_at_ms: i64,
    ) -> Envelope {
        let payload = signing_payload(&request, created_at_ms).unwrap();
        Envelope {
            auth: Some(CallMetadata {
                realm: self.state.config.realm.clone(),
                scheme: SIGNATURE_SCHEME.into(),
                member_id: member_id.into(),
                key_id: pair.key_id().into(),
                signature: paylink_core::Signer::sign(pair, &payload),
                created_at_ms,
                on_behalf_of: on_behalf_of.map(String::from),
                customer_initiated: false,
            }),
            request,
            client_version: CLIENT_VERSION.into(),
            trace_id: "test".into(),
        }
    }

    pub async fn call(
        &self,
        member: &TestMember,
        level: KeyLevel,
        request: Request,
    ) -> Result<Response, ApiError> {
        let envelope = self.envelope(&member.id, member.pair(level), None, request, self.now_ms());
        self.state.handle(envelope).await
    }

    pub async fn call_on_behalf_of(
        &self,
        member: &TestMember,
        token_id: &str,
        request: Request,
    ) -> Result<Response, ApiError> {
        let envelope = self.envelope(
            &member.id,
            member.pair(KeyLevel::Low),
            Some(token_id),
            request,
            self.now_ms(),
        );
        self.state.handle(envelope).await
    }

    /// Register a member with one key per level and an email alias
    pub async fn create_member(&self, email: &str) -> TestMember {
        let id = match self
            .unauthenticated(Request::CreateMemberId {
                member_type: MemberType::Personal,
            })
            .await
            .unwrap()
        {
            Response::MemberId { member_id } => member_id,
            other => panic!("unexpected response {:?}", other),
        };

        let member = TestMember {
            alias: Alias::email(email),
            low: KeyPair::generate(KeyLevel::Low),
            standard: KeyPair::generate(KeyLevel::Standard),
            privileged: KeyPair::generate(KeyLevel::Privileged),
            id,
        };
        let update = MemberUpdate::new(
            &member.id,
            "",
            vec![
                MemberOperation::add_key(member.privileged.key()),
                MemberOperation::add_key(member.standard.key()),
                MemberOperation::add_key(member.low.key()),
                MemberOperation::add_alias(member.alias.clone()),
            ],
        );
        let update_signature = sign_update(&update, &member.id, &member.privileged);
        self.unauthenticated(Request::CreateMember {
            update,
            update_signature,
        })
        .await
        .unwrap();
        member
    }

    pub async fn member_state(&self, member_id: &str) -> MemberState {
        self.state.store.get_member(member_id).await.unwrap().unwrap()
    }

    /// Submit `operations` on top of the member's current hash
    pub async fn update_member(
        &self,
        member: &TestMember,
        operations: Vec<MemberOperation>,
    ) -> Result<Response, ApiError> {
        let prev_hash = self.member_state(&member.id).await.last_hash;
        let update = MemberUpdate::new(&member.id, prev_hash, operations);
        self.submit_update(member, update).await
    }

    pub async fn submit_update(
        &self,
        member: &TestMember,
        update: MemberUpdate,
    ) -> Result<Response, ApiError> {
        let update_signature = sign_update(&update, &member.id, &member.privileged);
        self.call(
            member,
            KeyLevel::Privileged,
            Request::UpdateMember {
                update,
                update_signature,
            },
        )
        .await
    }

    pub async fn open_account(&self, member: &TestMember, balance: &str) -> Account {
        self.state
            .open_account(&member.id, "Checking", "USD", balance)
            .await
            .unwrap()
    }

    pub async fn create_token(
        &self,
        member: &TestMember,
        payload: TokenPayload,
    ) -> Result<Token, ApiError> {
        match self
            .call(member, KeyLevel::Low, Request::CreateToken { payload })
            .await?
        {
            Response::Token { token } => Ok(token),
            other => panic!("unexpected response {:?}", other),
        }
    }

    pub async fn endorse(
        &self,
        member: &TestMember,
        token_id: &str,
        level: KeyLevel,
    ) -> Result<Response, ApiError> {
        self.call(
            member,
            level,
            Request::EndorseToken {
                token_id: token_id.into(),
                signature: member.token_signature(token_id, Action::Endorsed, level),
            },
        )
        .await
    }

    /// A transfer token from `payer`'s account to `payee`, endorsed at STANDARD
    pub async fn endorsed_transfer_token(
        &self,
        payer: &TestMember,
        payee: &TestMember,
        account: &Account,
        amount: &str,
    ) -> Token {
        let payload = TokenPayload::transfer(amount, "USD")
            .from(&payer.id)
            .source_account(&account.id)
            .redeemer(&payee.id)
            .build()
            .unwrap();
        let token = self.create_token(payer, payload).await.unwrap();
        self.endorse(payer, &token.id, KeyLevel::Standard)
            .await
            .unwrap();
        self.state.store.get_token(&token.id).await.unwrap().unwrap()
    }

    /// An access token from `grantor` to `grantee`, endorsed at STANDARD
    pub async fn endorsed_access_token(
        &self,
        grantor: &TestMember,
        grantee: &TestMember,
        resources: Vec<Resource>,
    ) -> Token {
        let payload = TokenPayload::access(resources)
            .from(&grantor.id)
            .redeemer(&grantee.id)
            .build()
            .unwrap();
        let token = self.create_token(grantor, payload).await.unwrap();
        self.endorse(grantor, &token.id, KeyLevel::Standard)
            .await
            .unwrap();
        self.state.store.get_token(&token.id).await.unwrap().unwrap()
    }
}

pub fn sign_update(update: &MemberUpdate, member_id: &str, pair: &KeyPair) -> Signature {
    Signature::create(member_id, pair, &update.canonical_bytes().unwrap())
}
