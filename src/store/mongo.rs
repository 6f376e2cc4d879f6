use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use log::{debug, info};
use mongodb::bson::{doc, to_bson, Bson, Document};
use mongodb::error::{
    Error as MongoError, ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR,
    UNKNOWN_TRANSACTION_COMMIT_RESULT,
};
use mongodb::options::{ClientOptions, IndexOptions, ReturnDocument};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use tokio::time::sleep;

use super::{EntityStore, ParticipantOutcome, ResolveOutcome, StoreError, StoreResult};
use crate::models::{
    Decision, Event, JoinRequest, JoinRequestStatus, Message, Team, User, UserUpdate,
};

const USERS: &str = "users";
const TEAMS: &str = "teams";
const EVENTS: &str = "events";
const JOIN_REQUESTS: &str = "join_requests";
const MESSAGES: &str = "messages";

const DUPLICATE_KEY: i32 = 11000;
const MAX_TRANSACTION_ATTEMPTS: u32 = 8;
const RETRY_BACKOFF: Duration = Duration::from_millis(15);

/// How one transaction attempt on a join request ended.
enum ResolveAttempt {
    Committed(JoinRequest),
    NotPending,
    NoRoom(String),
}

impl From<MongoError> for StoreError {
    fn from(err: MongoError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == DUPLICATE_KEY,
        ErrorKind::Command(command_error) => command_error.code == DUPLICATE_KEY,
        _ => false,
    }
}

/// Maps a unique-index violation to `Duplicate` with a caller-facing reason.
fn duplicate_as(err: MongoError, reason: &str) -> StoreError {
    if is_duplicate_key(&err) {
        StoreError::Duplicate(reason.to_string())
    } else {
        err.into()
    }
}

fn timestamp(at: DateTime<Utc>) -> StoreResult<Bson> {
    to_bson(&at).map_err(|e| StoreError::Backend(format!("Error encoding timestamp: {e}")))
}

fn newest_first<T>(mut items: Vec<T>, created_at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
    items
}

/// MongoDB-backed entity store.
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, db_name: &str) -> StoreResult<Self> {
        let client_options = ClientOptions::parse(uri).await?;
        let client = Client::with_options(client_options)?;
        let db = client.database(db_name);
        let store = MongoStore { client, db };
        store.ensure_indexes().await?;
        info!("Connected to MongoDB database {}", db_name);
        Ok(store)
    }

    async fn ensure_indexes(&self) -> StoreResult<()> {
        let unique = || IndexOptions::builder().unique(true).build();
        self.users()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "username": 1 })
                    .options(unique())
                    .build(),
            )
            .await?;
        self.users()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(unique())
                    .build(),
            )
            .await?;
        // At most one pending request per (team, user); answered requests
        // fall out of the index so a user may ask again later.
        self.join_requests()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "teamId": 1, "userId": 1 })
                    .options(
                        IndexOptions::builder()
                            .unique(true)
                            .partial_filter_expression(doc! { "status": "pending" })
                            .build(),
                    )
                    .build(),
            )
            .await?;
        self.messages()
            .create_index(IndexModel::builder().keys(doc! { "teamId": 1 }).build())
            .await?;
        debug!("MongoDB indexes ensured");
        Ok(())
    }

    fn users(&self) -> Collection<User> {
        self.db.collection(USERS)
    }

    fn teams(&self) -> Collection<Team> {
        self.db.collection(TEAMS)
    }

    fn events(&self) -> Collection<Event> {
        self.db.collection(EVENTS)
    }

    fn join_requests(&self) -> Collection<JoinRequest> {
        self.db.collection(JOIN_REQUESTS)
    }

    fn messages(&self) -> Collection<Message> {
        self.db.collection(MESSAGES)
    }

    async fn collect<T>(&self, coll: Collection<T>, filter: Document) -> StoreResult<Vec<T>>
    where
        T: serde::de::DeserializeOwned + Send + Sync + Unpin,
    {
        let cursor = coll.find(filter).await?;
        Ok(cursor.try_collect().await?)
    }

    /// Why a conditional request transition matched nothing.
    async fn unresolved_reason(&self, request_id: &str) -> StoreResult<ResolveOutcome> {
        Ok(match self.find_join_request(request_id).await? {
            Some(request) => ResolveOutcome::AlreadyResolved(request.status),
            None => ResolveOutcome::RequestMissing,
        })
    }

    /// One transactional pass over a join request: a compare-and-set out of
    /// `pending`, then on approval a capacity-checked member append.
    async fn resolve_once(
        &self,
        session: &mut ClientSession,
        request_id: &str,
        decision: Decision,
        responder_id: &str,
        responded_at: &Bson,
    ) -> Result<ResolveAttempt, MongoError> {
        session.start_transaction().await?;

        let claim = doc! { "_id": request_id, "status": JoinRequestStatus::Pending.as_str() };
        let transition = doc! {
            "$set": {
                "status": decision.status().as_str(),
                "respondedAt": responded_at.clone(),
                "respondedBy": responder_id,
            }
        };
        let claimed = self
            .join_requests()
            .find_one_and_update(claim, transition)
            .return_document(ReturnDocument::After)
            .session(&mut *session)
            .await?;
        let Some(request) = claimed else {
            session.abort_transaction().await?;
            return Ok(ResolveAttempt::NotPending);
        };

        if decision == Decision::Approve {
            let has_room = doc! {
                "_id": request.team_id.as_str(),
                "$or": [
                    { "members": request.user_id.as_str() },
                    { "$expr": { "$lt": [ { "$size": "$members" }, "$maxMembers" ] } },
                ],
            };
            let join = doc! {
                "$addToSet": { "members": request.user_id.as_str() },
                "$set": { "updatedAt": responded_at.clone() },
            };
            let joined = self
                .teams()
                .update_one(has_room, join)
                .session(&mut *session)
                .await?;
            if joined.matched_count == 0 {
                session.abort_transaction().await?;
                return Ok(ResolveAttempt::NoRoom(request.team_id));
            }
        }

        Self::commit(session).await?;
        Ok(ResolveAttempt::Committed(request))
    }

    async fn commit(session: &mut ClientSession) -> Result<(), MongoError> {
        let mut attempt = 1;
        loop {
            match session.commit_transaction().await {
                Err(err)
                    if err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
                        && attempt < MAX_TRANSACTION_ATTEMPTS =>
                {
                    debug!("Retrying commit (attempt {}): {}", attempt, err);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl EntityStore for MongoStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        self.users()
            .insert_one(user)
            .await
            .map_err(|e| duplicate_as(e, "User already exists"))?;
        Ok(())
    }

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.users().find_one(doc! { "_id": id }).await?)
    }

    async fn find_users(&self, ids: &[String]) -> StoreResult<Vec<User>> {
        self.collect(self.users(), doc! { "_id": { "$in": ids.to_vec() } }).await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.users().find_one(doc! { "email": email }).await?)
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self.users().find_one(doc! { "username": username }).await?)
    }

    async fn update_user(
        &self,
        id: &str,
        update: &UserUpdate,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<User>> {
        let mut set = doc! { "updatedAt": timestamp(at)? };
        if let Some(username) = &update.username {
            set.insert("username", username.as_str());
        }
        if let Some(email) = &update.email {
            set.insert("email", email.as_str());
        }
        if let Some(age) = update.age {
            set.insert("age", i32::from(age));
        }
        if let Some(gender) = update.gender {
            let gender = to_bson(&gender).map_err(|e| StoreError::Backend(e.to_string()))?;
            set.insert("gender", gender);
        }
        if let Some(role) = &update.role {
            set.insert("role", role.as_str());
        }
        if let Some(desc) = &update.role_description {
            set.insert("roleDescription", desc.as_str());
        }
        if let Some(location) = &update.location {
            set.insert("location", location.as_str());
        }
        if let Some(experience) = update.experience {
            set.insert("experience", i64::from(experience));
        }
        if let Some(picture) = &update.profile_picture {
            set.insert("profilePicture", picture.as_str());
        }
        if let Some(hash) = &update.password_hash {
            set.insert("passwordHash", hash.as_str());
        }

        self.users()
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| duplicate_as(e, "Username or email already taken"))
    }

    async fn insert_team(&self, team: &Team) -> StoreResult<()> {
        self.teams().insert_one(team).await?;
        Ok(())
    }

    async fn find_team(&self, id: &str) -> StoreResult<Option<Team>> {
        Ok(self.teams().find_one(doc! { "_id": id }).await?)
    }

    async fn find_teams(&self, ids: &[String]) -> StoreResult<Vec<Team>> {
        self.collect(self.teams(), doc! { "_id": { "$in": ids.to_vec() } }).await
    }

    async fn list_teams(&self) -> StoreResult<Vec<Team>> {
        let teams = self.collect(self.teams(), doc! {}).await?;
        Ok(newest_first(teams, |t| t.created_at))
    }

    async fn teams_with_member(&self, user_id: &str) -> StoreResult<Vec<Team>> {
        let teams = self.collect(self.teams(), doc! { "members": user_id }).await?;
        Ok(newest_first(teams, |t| t.created_at))
    }

    async fn insert_event(&self, event: &Event) -> StoreResult<()> {
        self.events().insert_one(event).await?;
        Ok(())
    }

    async fn find_event(&self, id: &str) -> StoreResult<Option<Event>> {
        Ok(self.events().find_one(doc! { "_id": id }).await?)
    }

    async fn list_events(&self) -> StoreResult<Vec<Event>> {
        let events = self.collect(self.events(), doc! {}).await?;
        Ok(newest_first(events, |e| e.created_at))
    }

    async fn add_event_participant(
        &self,
        event_id: &str,
        team_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<ParticipantOutcome> {
        let filter = doc! {
            "_id": event_id,
            "participants": { "$ne": team_id },
            "$expr": {
                "$lt": [
                    { "$size": "$participants" },
                    "$participantRules.maxParticipants",
                ]
            },
        };
        let update = doc! {
            "$push": { "participants": team_id },
            "$set": { "updatedAt": timestamp(at)? },
        };
        let updated = self
            .events()
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After)
            .await?;
        if let Some(event) = updated {
            return Ok(ParticipantOutcome::Added(event));
        }

        Ok(match self.find_event(event_id).await? {
            None => ParticipantOutcome::EventMissing,
            Some(event) if event.has_participant(team_id) => ParticipantOutcome::AlreadyRegistered,
            Some(_) => ParticipantOutcome::EventFull,
        })
    }

    async fn insert_join_request(&self, request: &JoinRequest) -> StoreResult<()> {
        self.join_requests()
            .insert_one(request)
            .await
            .map_err(|e| duplicate_as(e, "You already have a pending request for this team"))?;
        Ok(())
    }

    async fn find_join_request(&self, id: &str) -> StoreResult<Option<JoinRequest>> {
        Ok(self.join_requests().find_one(doc! { "_id": id }).await?)
    }

    async fn pending_requests_for_team(&self, team_id: &str) -> StoreResult<Vec<JoinRequest>> {
        let filter = doc! { "teamId": team_id, "status": JoinRequestStatus::Pending.as_str() };
        let mut requests = self.collect(self.join_requests(), filter).await?;
        requests.sort_by_key(|r| r.requested_at);
        Ok(requests)
    }

    async fn pending_requests_for_user(&self, user_id: &str) -> StoreResult<Vec<JoinRequest>> {
        let filter = doc! { "userId": user_id, "status": JoinRequestStatus::Pending.as_str() };
        let mut requests = self.collect(self.join_requests(), filter).await?;
        requests.sort_by_key(|r| r.requested_at);
        Ok(requests)
    }

    async fn resolve_join_request(
        &self,
        request_id: &str,
        decision: Decision,
        responder_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<ResolveOutcome> {
        let responded_at = timestamp(at)?;
        let mut attempt = 1;
        loop {
            // A dropped session aborts whatever transaction it still holds.
            let mut session = self.client.start_session().await?;
            let result = self
                .resolve_once(&mut session, request_id, decision, responder_id, &responded_at)
                .await;
            match result {
                Ok(ResolveAttempt::Committed(request)) => {
                    return Ok(ResolveOutcome::Resolved(request))
                }
                Ok(ResolveAttempt::NotPending) => return self.unresolved_reason(request_id).await,
                Ok(ResolveAttempt::NoRoom(team_id)) => {
                    return Ok(match self.find_team(&team_id).await? {
                        Some(_) => ResolveOutcome::TeamFull,
                        None => ResolveOutcome::TeamMissing,
                    })
                }
                Err(err)
                    if err.contains_label(TRANSIENT_TRANSACTION_ERROR)
                        && attempt < MAX_TRANSACTION_ATTEMPTS =>
                {
                    debug!(
                        "Retrying join request {} (attempt {}): {}",
                        request_id, attempt, err
                    );
                    sleep(RETRY_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn insert_message(&self, message: &Message) -> StoreResult<()> {
        self.messages().insert_one(message).await?;
        Ok(())
    }

    async fn messages_for_team(&self, team_id: &str) -> StoreResult<Vec<Message>> {
        let mut messages = self.collect(self.messages(), doc! { "teamId": team_id }).await?;
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eligibility::tests::{at, january_event};
    use crate::models::new_id;
    use futures::future::join_all;
    use mongodb::bson::from_document;
    use mongodb::error::{CommandError, WriteError};

    #[test]
    fn duplicate_key_errors_are_recognised() {
        let write: WriteError = from_document(doc! {
            "code": DUPLICATE_KEY,
            "codeName": "DuplicateKey",
            "errmsg": "E11000 duplicate key error",
        })
        .unwrap();
        let err = MongoError::from(ErrorKind::Write(WriteFailure::WriteError(write)));
        assert!(is_duplicate_key(&err));
        assert!(matches!(
            duplicate_as(err, "User already exists"),
            StoreError::Duplicate(reason) if reason == "User already exists"
        ));

        let command: CommandError = from_document(doc! {
            "code": DUPLICATE_KEY,
            "codeName": "DuplicateKey",
            "errmsg": "E11000 duplicate key error",
        })
        .unwrap();
        assert!(is_duplicate_key(&MongoError::from(ErrorKind::Command(command))));

        let conflict: CommandError = from_document(doc! {
            "code": 112,
            "codeName": "WriteConflict",
            "errmsg": "write conflict",
        })
        .unwrap();
        let err = MongoError::from(ErrorKind::Command(conflict));
        assert!(!is_duplicate_key(&err));
        assert!(matches!(duplicate_as(err, "taken"), StoreError::Backend(_)));
    }

    /// A throwaway database on the server named by `MONGO_URI`. Transactions
    /// need a replica set.
    struct TestDatabase {
        store: MongoStore,
    }

    impl TestDatabase {
        async fn new() -> Self {
            let uri = std::env::var("MONGO_URI").expect("MONGO_URI must be set");
            let name = format!("teamhub_test_{}", new_id().replace('-', ""));
            let store = MongoStore::connect(&uri, &name)
                .await
                .expect("connect to test database");
            Self { store }
        }

        async fn cleanup(self) {
            self.store.db.drop().await.expect("drop test database");
        }
    }

    fn team(creator: &str, members: &[&str], max_members: u32) -> Team {
        Team {
            id: new_id(),
            name: "Crabs".into(),
            aim: "win".into(),
            description: String::new(),
            max_members,
            members: std::iter::once(creator)
                .chain(members.iter().copied())
                .map(str::to_string)
                .collect(),
            skills: vec![],
            created_by: creator.into(),
            created_at: at(2024, 1, 1),
            updated_at: at(2024, 1, 1),
        }
    }

    fn pending(team_id: &str, user_id: &str) -> JoinRequest {
        JoinRequest {
            id: new_id(),
            team_id: team_id.into(),
            user_id: user_id.into(),
            status: JoinRequestStatus::Pending,
            message: String::new(),
            requested_at: at(2024, 1, 2),
            responded_at: None,
            responded_by: None,
        }
    }

    #[tokio::test]
    #[ignore = "needs MONGO_URI pointing at a MongoDB replica set"]
    async fn registration_stops_at_capacity_under_contention() {
        let db = TestDatabase::new().await;
        let store = &db.store;
        let mut event = january_event();
        event.id = new_id();
        event.participant_rules.max_participants = 2;
        store.insert_event(&event).await.unwrap();

        let teams: Vec<String> = (0..6).map(|i| format!("team-{i}")).collect();
        let outcomes = join_all(
            teams
                .iter()
                .map(|team_id| store.add_event_participant(&event.id, team_id, at(2024, 1, 2))),
        )
        .await;
        let added = outcomes
            .iter()
            .filter(|o| matches!(o, Ok(ParticipantOutcome::Added(_))))
            .count();
        let full = outcomes
            .iter()
            .filter(|o| matches!(o, Ok(ParticipantOutcome::EventFull)))
            .count();
        assert_eq!((added, full), (2, 4));

        let stored = store.find_event(&event.id).await.unwrap().unwrap();
        assert_eq!(stored.participants_count(), 2);
        assert!(matches!(
            store
                .add_event_participant(&event.id, &stored.participants[0], at(2024, 1, 3))
                .await
                .unwrap(),
            ParticipantOutcome::AlreadyRegistered
        ));
        assert!(matches!(
            store
                .add_event_participant("missing", "team-0", at(2024, 1, 3))
                .await
                .unwrap(),
            ParticipantOutcome::EventMissing
        ));
        db.cleanup().await;
    }

    #[tokio::test]
    #[ignore = "needs MONGO_URI pointing at a MongoDB replica set"]
    async fn one_pending_request_per_user_and_team() {
        let db = TestDatabase::new().await;
        let store = &db.store;

        let inserts = join_all((0..5).map(|_| {
            let request = pending("team-1", "bob");
            async move { store.insert_join_request(&request).await }
        }))
        .await;
        assert_eq!(inserts.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            inserts
                .iter()
                .filter(|r| matches!(r, Err(StoreError::Duplicate(_))))
                .count(),
            4
        );

        let open = store.pending_requests_for_team("team-1").await.unwrap();
        assert_eq!(open.len(), 1);
        let outcome = store
            .resolve_join_request(&open[0].id, Decision::Reject, "alice", at(2024, 1, 3))
            .await
            .unwrap();
        assert!(matches!(outcome, ResolveOutcome::Resolved(ref r) if r.status == JoinRequestStatus::Rejected));

        // An answered request no longer blocks a new one.
        store.insert_join_request(&pending("team-1", "bob")).await.unwrap();
        assert_eq!(store.pending_requests_for_user("bob").await.unwrap().len(), 1);
        db.cleanup().await;
    }

    #[tokio::test]
    #[ignore = "needs MONGO_URI pointing at a MongoDB replica set"]
    async fn concurrent_approvals_fill_only_the_open_seat() {
        let db = TestDatabase::new().await;
        let store = &db.store;
        let team = team("alice", &["carol"], 3);
        store.insert_team(&team).await.unwrap();

        let requests: Vec<JoinRequest> = ["u1", "u2", "u3", "u4"]
            .iter()
            .map(|user| pending(&team.id, user))
            .collect();
        for request in &requests {
            store.insert_join_request(request).await.unwrap();
        }

        let outcomes = join_all(requests.iter().map(|request| {
            store.resolve_join_request(&request.id, Decision::Approve, "alice", at(2024, 1, 3))
        }))
        .await;
        let approved: Vec<&JoinRequest> = outcomes
            .iter()
            .filter_map(|o| match o {
                Ok(ResolveOutcome::Resolved(request)) => Some(request),
                _ => None,
            })
            .collect();
        let full = outcomes
            .iter()
            .filter(|o| matches!(o, Ok(ResolveOutcome::TeamFull)))
            .count();
        assert_eq!((approved.len(), full), (1, 3));

        let stored = store.find_team(&team.id).await.unwrap().unwrap();
        assert_eq!(stored.member_count(), 3);
        assert!(stored.has_member(&approved[0].user_id));
        // Losing approvals roll back and leave their requests pending.
        assert_eq!(store.pending_requests_for_team(&team.id).await.unwrap().len(), 3);

        let again = store
            .resolve_join_request(&approved[0].id, Decision::Approve, "alice", at(2024, 1, 4))
            .await
            .unwrap();
        assert!(matches!(again, ResolveOutcome::AlreadyResolved(JoinRequestStatus::Approved)));
        assert!(matches!(
            store
                .resolve_join_request("missing", Decision::Reject, "alice", at(2024, 1, 4))
                .await
                .unwrap(),
            ResolveOutcome::RequestMissing
        ));
        db.cleanup().await;
    }
}
