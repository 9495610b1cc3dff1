use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Serialize, de::DeserializeOwned};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::dao::{
    models::{
        AtomicSeatOutcome, NewRideEntity, NewUserProfileEntity, ParticipantEntity, RideEntity,
        RidePatchEntity, SeatAdjustment, SeatUpdate, UserProfileEntity,
    },
    ride_store::RideBackend,
    storage::StorageResult,
};

use super::{
    config::PostgrestConfig,
    error::{PostgrestError, PostgrestResult},
    models::{
        ErrorBody, ParticipantInsert, RideIdRow, SeatAdjustArgs, SeatAdjustResponse,
        SeatProcedureArgs, SeatProcedureResponse, WhatsappPatch,
    },
};

const RIDES: &str = "rides";
const PARTICIPANTS: &str = "ride_participants";
const PROFILES: &str = "user_profiles";

type Query<'a> = [(&'a str, String)];

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

/// Access token shared between the table client and the change feed.
pub(super) type SharedToken = Arc<RwLock<Option<Arc<str>>>>;

/// [`RideBackend`] over the PostgREST tables and procedures.
#[derive(Clone)]
pub struct PostgrestRideStore {
    pub(super) client: Client,
    rest_url: Arc<str>,
    pub(super) anon_key: Arc<str>,
    pub(super) token: SharedToken,
    pub(super) config: Arc<PostgrestConfig>,
}

impl PostgrestRideStore {
    /// Build the client and verify the REST endpoint answers.
    pub async fn connect(config: PostgrestConfig) -> PostgrestResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| PostgrestError::ClientBuilder { source })?;

        let store = Self {
            client,
            rest_url: Arc::from(config.rest_url()),
            anon_key: Arc::from(config.anon_key.as_str()),
            token: Arc::new(RwLock::new(None)),
            config: Arc::new(config),
        };
        store.ping().await?;
        Ok(store)
    }

    /// Bearer credential: the user's access token, or the anon key when signed out.
    pub(super) fn bearer(&self) -> Arc<str> {
        self.token
            .read()
            .ok()
            .and_then(|guard| guard.clone())
            .unwrap_or_else(|| self.anon_key.clone())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.rest_url, path);
        self.client
            .request(method, url)
            .header("apikey", self.anon_key.as_ref())
            .bearer_auth(self.bearer())
    }

    async fn send(&self, builder: RequestBuilder, path: &str) -> PostgrestResult<Response> {
        let response = builder
            .send()
            .await
            .map_err(|source| PostgrestError::RequestSend {
                path: path.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.json::<ErrorBody>().await.unwrap_or_default();
        Err(PostgrestError::RequestStatus {
            path: path.to_string(),
            status,
            code: body.code,
            message: body
                .message
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
        })
    }

    async fn rows<T>(&self, builder: RequestBuilder, path: &str) -> PostgrestResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        self.send(builder, path)
            .await?
            .json::<Vec<T>>()
            .await
            .map_err(|source| PostgrestError::DecodeResponse {
                path: path.to_string(),
                source,
            })
    }

    async fn select<T>(&self, table: &str, query: &Query<'_>) -> PostgrestResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let builder = self.request(Method::GET, table).query(query);
        self.rows(builder, table).await
    }

    async fn insert<B, T>(&self, table: &str, body: &B) -> PostgrestResult<Vec<T>>
    where
        B: ?Sized + Serialize,
        T: DeserializeOwned,
    {
        let builder = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(body);
        self.rows(builder, table).await
    }

    async fn patch<B, T>(&self, table: &str, query: &Query<'_>, body: &B) -> PostgrestResult<Vec<T>>
    where
        B: ?Sized + Serialize,
        T: DeserializeOwned,
    {
        let builder = self
            .request(Method::PATCH, table)
            .query(query)
            .header("Prefer", "return=representation")
            .json(body);
        self.rows(builder, table).await
    }

    async fn delete<T>(&self, table: &str, query: &Query<'_>) -> PostgrestResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let builder = self
            .request(Method::DELETE, table)
            .query(query)
            .header("Prefer", "return=representation");
        self.rows(builder, table).await
    }

    async fn rpc<B, T>(&self, procedure: &str, args: &B) -> PostgrestResult<T>
    where
        B: ?Sized + Serialize,
        T: DeserializeOwned,
    {
        let path = format!("rpc/{procedure}");
        let builder = self.request(Method::POST, &path).json(args);
        self.send(builder, &path)
            .await?
            .json::<T>()
            .await
            .map_err(|source| PostgrestError::DecodeResponse { path, source })
    }

    async fn ping(&self) -> PostgrestResult<()> {
        let builder = self
            .request(Method::GET, RIDES)
            .query(&[("select", "id"), ("limit", "1")]);
        self.send(builder, RIDES).await.map(|_| ())
    }

    async fn fetch_ride(&self, id: Uuid) -> PostgrestResult<Option<RideEntity>> {
        let rows = self
            .select::<RideEntity>(RIDES, &[("select", "*".to_string()), ("id", eq(id))])
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Bounded seat update performed server-side in one statement.
    async fn call_adjust_seats(
        &self,
        ride_id: Uuid,
        adjustment: SeatAdjustment,
    ) -> PostgrestResult<SeatUpdate> {
        let args = SeatAdjustArgs::new(ride_id, adjustment);
        self.rpc::<_, SeatAdjustResponse>("adjust_seats", &args)
            .await?
            .into_update()
    }

    async fn call_seat_procedure(
        &self,
        procedure: &'static str,
        ride_id: Uuid,
        user_id: Uuid,
    ) -> PostgrestResult<AtomicSeatOutcome> {
        let args = SeatProcedureArgs {
            p_ride_id: ride_id,
            p_user_id: user_id,
        };
        self.rpc::<_, SeatProcedureResponse>(procedure, &args)
            .await?
            .into_outcome(procedure)
    }
}

impl RideBackend for PostgrestRideStore {
    fn list_rides(&self) -> BoxFuture<'static, StorageResult<Vec<RideEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let query = [("select", "*".to_string()), ("order", "created_at.desc".to_string())];
            Ok(store.select(RIDES, &query).await?)
        })
    }

    fn find_ride(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RideEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.fetch_ride(id).await?) })
    }

    fn insert_ride(&self, ride: NewRideEntity) -> BoxFuture<'static, StorageResult<RideEntity>> {
        let store = self.clone();
        Box::pin(async move {
            let rows = store.insert::<_, RideEntity>(RIDES, &ride).await?;
            rows.into_iter().next().ok_or_else(|| {
                PostgrestError::RequestStatus {
                    path: RIDES.into(),
                    status: reqwest::StatusCode::FORBIDDEN,
                    code: None,
                    message: "insert returned no row".into(),
                }
                .into()
            })
        })
    }

    fn update_ride(
        &self,
        id: Uuid,
        patch: RidePatchEntity,
    ) -> BoxFuture<'static, StorageResult<Option<RideEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let rows = store
                .patch::<_, RideEntity>(RIDES, &[("id", eq(id))], &patch)
                .await?;
            Ok(rows.into_iter().next())
        })
    }

    fn delete_ride(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            // Participant rows go with it through the foreign key's ON DELETE CASCADE.
            let rows = store
                .delete::<RideEntity>(RIDES, &[("id", eq(id))])
                .await?;
            Ok(!rows.is_empty())
        })
    }

    fn joined_ride_ids(&self, user_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<Uuid>>> {
        let store = self.clone();
        Box::pin(async move {
            let query = [("select", "ride_id".to_string()), ("user_id", eq(user_id))];
            let rows = store.select::<RideIdRow>(PARTICIPANTS, &query).await?;
            Ok(rows.into_iter().map(|row| row.ride_id).collect())
        })
    }

    fn list_participants(
        &self,
        ride_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let query = [
                ("select", "*".to_string()),
                ("ride_id", eq(ride_id)),
                ("order", "joined_at.asc".to_string()),
            ];
            Ok(store.select(PARTICIPANTS, &query).await?)
        })
    }

    fn insert_participant(
        &self,
        ride_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .insert::<_, ParticipantEntity>(PARTICIPANTS, &ParticipantInsert { ride_id, user_id })
                .await?;
            Ok(())
        })
    }

    fn delete_participant(
        &self,
        ride_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let query = [("ride_id", eq(ride_id)), ("user_id", eq(user_id))];
            let rows = store.delete::<ParticipantEntity>(PARTICIPANTS, &query).await?;
            Ok(!rows.is_empty())
        })
    }

    fn adjust_seats(
        &self,
        ride_id: Uuid,
        adjustment: SeatAdjustment,
    ) -> BoxFuture<'static, StorageResult<SeatUpdate>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.call_adjust_seats(ride_id, adjustment).await?) })
    }

    fn join_ride_atomic(
        &self,
        ride_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<AtomicSeatOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .call_seat_procedure("join_ride", ride_id, user_id)
                .await?)
        })
    }

    fn leave_ride_atomic(
        &self,
        ride_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<AtomicSeatOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .call_seat_procedure("leave_ride", ride_id, user_id)
                .await?)
        })
    }

    fn find_profile(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<UserProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let rows = store
                .select::<UserProfileEntity>(PROFILES, &[("select", "*".to_string()), ("id", eq(id))])
                .await?;
            Ok(rows.into_iter().next())
        })
    }

    fn insert_profile(
        &self,
        profile: NewUserProfileEntity,
    ) -> BoxFuture<'static, StorageResult<UserProfileEntity>> {
        let store = self.clone();
        Box::pin(async move {
            let rows = store
                .insert::<_, UserProfileEntity>(PROFILES, &profile)
                .await?;
            rows.into_iter().next().ok_or_else(|| {
                PostgrestError::RequestStatus {
                    path: PROFILES.into(),
                    status: reqwest::StatusCode::FORBIDDEN,
                    code: None,
                    message: "insert returned no row".into(),
                }
                .into()
            })
        })
    }

    fn update_whatsapp(
        &self,
        id: Uuid,
        whatsapp: String,
    ) -> BoxFuture<'static, StorageResult<Option<UserProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let patch = WhatsappPatch {
                whatsapp,
                updated_at: OffsetDateTime::now_utc(),
            };
            let rows = store
                .patch::<_, UserProfileEntity>(PROFILES, &[("id", eq(id))], &patch)
                .await?;
            Ok(rows.into_iter().next())
        })
    }

    fn set_access_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = token.map(Arc::from);
        }
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.ping().await?) })
    }
}
