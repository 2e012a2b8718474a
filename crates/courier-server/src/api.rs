use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Path, Query, Request, State},
    http::{HeaderValue, Method, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use courier_shared::types::{FriendshipStatus, GroupId, MemberRole, UserId, UserStatus};
use courier_shared::validation::{validate_username, Pagination};
use courier_shared::ValidationError;
use courier_store::{Group, GroupMember, Message, NewGroup, ProfileUpdate, StoreError, User};

use crate::auth::Caller;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::state::{lock_db, run_blocking, AppState};
use crate::ws::ws_handler;

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(ws_handler))
        .route("/users", post(create_user))
        .route("/users/me", get(get_profile).put(update_profile))
        .route("/friends", get(list_friends).post(add_friend))
        .route("/friends/:id", delete(remove_friend))
        .route("/groups", get(list_groups).post(create_group))
        .route(
            "/groups/:id/members",
            get(list_group_members).post(add_group_member),
        )
        .route("/groups/:id/members/:user_id", delete(remove_group_member))
        .route("/messages/private", post(send_private_message))
        .route("/messages/private/:user_id", get(private_history))
        .route("/messages/group", post(send_group_message))
        .route("/messages/group/:group_id", get(group_history))
        .route("/messages/read", post(mark_messages_read))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    if config.cors_allow_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_allow_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}

/// `Json` whose rejection renders through [`ServerError`], so malformed
/// bodies answer `400 {"error": ...}` like every other failure.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e: JsonRejection| ServerError::BadRequest(e.body_text()))?;
        Ok(Self(value))
    }
}

// ─── Request / response bodies ───

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    name: String,
    online_users: usize,
}

#[derive(Deserialize)]
struct CreateUserRequest {
    username: String,
    email: Option<String>,
}

#[derive(Deserialize)]
struct UpdateProfileRequest {
    email: Option<String>,
    avatar: Option<String>,
    status: Option<String>,
}

#[derive(Serialize)]
struct UserResponse {
    user: User,
}

#[derive(Serialize)]
struct UserUpdatedResponse {
    message: &'static str,
    user: User,
}

/// Public view of a friend.
#[derive(Serialize)]
struct FriendSummary {
    id: UserId,
    username: String,
    avatar: String,
    status: UserStatus,
}

impl From<User> for FriendSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            avatar: user.avatar,
            status: user.status,
        }
    }
}

#[derive(Serialize)]
struct FriendsResponse {
    friends: Vec<FriendSummary>,
}

/// `friendId` carries the friend's username.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddFriendRequest {
    friend_id: String,
}

#[derive(Serialize)]
struct FriendAddedResponse {
    message: &'static str,
    friend: FriendSummary,
}

#[derive(Serialize)]
struct AckResponse {
    message: &'static str,
}

#[derive(Deserialize)]
struct CreateGroupRequest {
    name: String,
    #[serde(default)]
    description: String,
    avatar: Option<String>,
}

#[derive(Serialize)]
struct GroupResponse {
    group: Group,
}

#[derive(Serialize)]
struct GroupsResponse {
    groups: Vec<Group>,
}

#[derive(Serialize)]
struct MembersResponse {
    members: Vec<GroupMember>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddMemberRequest {
    user_id: String,
    role: Option<String>,
}

#[derive(Serialize)]
struct MemberAddedResponse {
    message: &'static str,
    member: GroupMember,
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<String>,
    skip: Option<String>,
}

impl HistoryQuery {
    fn page(&self) -> Pagination {
        Pagination::from_query(self.limit.as_deref(), self.skip.as_deref())
    }
}

#[derive(Serialize)]
struct HistoryResponse {
    messages: Vec<Message>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendPrivateRequest {
    receiver_id: String,
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendGroupRequest {
    group_id: String,
    content: String,
}

#[derive(Serialize)]
struct SentResponse {
    message: &'static str,
    data: Message,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkReadRequest {
    message_ids: Vec<String>,
}

#[derive(Serialize)]
struct MarkedReadResponse {
    message: &'static str,
    updated: usize,
}

// ─── Health ───

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        name: state.config.instance_name.clone(),
        online_users: state.hub.online_users().len(),
    })
}

// ─── Users ───

async fn create_user(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ServerError> {
    let username = req.username.trim();
    validate_username(username)?;
    let email = req.email.as_deref().map(str::trim).filter(|e| !e.is_empty());

    let user = lock_db(&state.db)?.create_user(username, email)?;
    info!(user = %user.id, username = %user.username, "User created");

    Ok((StatusCode::CREATED, Json(UserResponse { user })))
}

async fn get_profile(
    Caller(me): Caller,
    State(state): State<AppState>,
) -> Result<Json<UserResponse>, ServerError> {
    let user = lock_db(&state.db)?
        .get_user(me)
        .map_err(|e| not_found_as(e, "User not found"))?;
    Ok(Json(UserResponse { user }))
}

async fn update_profile(
    Caller(me): Caller,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<Json<UserUpdatedResponse>, ServerError> {
    let status = match req.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(UserStatus::parse(raw).ok_or_else(|| {
            ServerError::from(ValidationError::InvalidValue {
                field: "status",
                value: raw.to_string(),
            })
        })?),
        None => None,
    };
    let update = ProfileUpdate {
        email: req.email.filter(|e| !e.trim().is_empty()),
        avatar: req.avatar.filter(|a| !a.is_empty()),
        status,
    };

    let user = lock_db(&state.db)?
        .update_user_profile(me, &update)
        .map_err(|e| not_found_as(e, "User not found"))?;

    Ok(Json(UserUpdatedResponse {
        message: "Profile updated",
        user,
    }))
}

// ─── Friends ───

async fn list_friends(
    Caller(me): Caller,
    State(state): State<AppState>,
) -> Result<Json<FriendsResponse>, ServerError> {
    let db = lock_db(&state.db)?;
    let edges = db.list_friendships(me, Some(FriendshipStatus::Accepted))?;

    let mut friends = Vec::with_capacity(edges.len());
    for edge in edges {
        // Friends whose profile has since been deleted are skipped.
        if let Ok(user) = db.get_user(edge.other(me)) {
            friends.push(FriendSummary::from(user));
        }
    }

    Ok(Json(FriendsResponse { friends }))
}

/// Add a friend by username. The edge goes straight to `accepted`; there is
/// no approval step.
async fn add_friend(
    Caller(me): Caller,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AddFriendRequest>,
) -> Result<Json<FriendAddedResponse>, ServerError> {
    let db = lock_db(&state.db)?;

    let friend = db
        .get_user_by_username(req.friend_id.trim())
        .map_err(|e| not_found_as(e, "User not found"))?;
    if friend.id == me {
        return Err(ServerError::BadRequest(
            "Cannot add yourself as a friend".into(),
        ));
    }

    let edge = db.add_friendship(me, friend.id)?;
    db.set_friendship_status(edge.id, FriendshipStatus::Accepted)?;
    info!(user = %me, friend = %friend.id, "Friend added");

    Ok(Json(FriendAddedResponse {
        message: "Friend added",
        friend: friend.into(),
    }))
}

async fn remove_friend(
    Caller(me): Caller,
    State(state): State<AppState>,
    Path(friend): Path<String>,
) -> Result<Json<AckResponse>, ServerError> {
    let missing = || ServerError::NotFound("Friendship not found".into());
    let friend_id = UserId::from_hex(&friend).map_err(|_| missing())?;

    let db = lock_db(&state.db)?;
    let edge = db.find_friendship(me, friend_id, None)?.ok_or_else(missing)?;
    db.soft_delete_friendship(edge.id)?;
    info!(user = %me, friend = %friend_id, "Friend removed");

    Ok(Json(AckResponse {
        message: "Friend removed",
    }))
}

// ─── Groups ───

async fn list_groups(
    Caller(me): Caller,
    State(state): State<AppState>,
) -> Result<Json<GroupsResponse>, ServerError> {
    let groups = lock_db(&state.db)?.list_groups_for_user(me)?;
    Ok(Json(GroupsResponse { groups }))
}

async fn create_group(
    Caller(me): Caller,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateGroupRequest>,
) -> Result<(StatusCode, Json<GroupResponse>), ServerError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ValidationError::Empty("name").into());
    }

    let group = lock_db(&state.db)?
        .create_group(
            &NewGroup {
                name: name.to_string(),
                description: req.description,
                avatar: req.avatar,
            },
            me,
        )
        .map_err(|e| not_found_as(e, "User not found"))?;
    info!(group = %group.id, creator = %me, "Group created");

    Ok((StatusCode::CREATED, Json(GroupResponse { group })))
}

fn parse_group(raw: &str) -> Result<GroupId, ServerError> {
    GroupId::from_hex(raw).map_err(|_| ServerError::NotFound("Group not found".into()))
}

async fn list_group_members(
    Caller(me): Caller,
    State(state): State<AppState>,
    Path(group): Path<String>,
) -> Result<Json<MembersResponse>, ServerError> {
    let group_id = parse_group(&group)?;

    let db = lock_db(&state.db)?;
    db.get_group(group_id)
        .map_err(|e| not_found_as(e, "Group not found"))?;
    if !db.is_group_member(group_id, me)? {
        return Err(ServerError::Forbidden(
            "You are not a member of this group".into(),
        ));
    }

    let members = db.list_group_members(group_id)?;
    Ok(Json(MembersResponse { members }))
}

async fn add_group_member(
    Caller(me): Caller,
    State(state): State<AppState>,
    Path(group): Path<String>,
    ApiJson(req): ApiJson<AddMemberRequest>,
) -> Result<Json<MemberAddedResponse>, ServerError> {
    let group_id = parse_group(&group)?;
    let user_id = UserId::from_hex(&req.user_id)
        .map_err(|_| ServerError::NotFound("User not found".into()))?;
    let role = match req.role.as_deref() {
        Some(raw) => MemberRole::parse(raw).ok_or_else(|| {
            ServerError::from(ValidationError::InvalidValue {
                field: "role",
                value: raw.to_string(),
            })
        })?,
        None => MemberRole::Member,
    };

    let db = lock_db(&state.db)?;
    db.get_group(group_id)
        .map_err(|e| not_found_as(e, "Group not found"))?;
    require_admin(db.get_membership(group_id, me)?)?;

    let member = db
        .add_group_member(group_id, user_id, role)
        .map_err(|e| not_found_as(e, "User not found"))?;
    info!(group = %group_id, user = %user_id, by = %me, "Group member added");

    Ok(Json(MemberAddedResponse {
        message: "Member added",
        member,
    }))
}

/// Admins may remove anyone; any member may remove themselves.
async fn remove_group_member(
    Caller(me): Caller,
    State(state): State<AppState>,
    Path((group, user)): Path<(String, String)>,
) -> Result<Json<AckResponse>, ServerError> {
    let group_id = parse_group(&group)?;
    let missing = || ServerError::NotFound("Membership not found".into());
    let user_id = UserId::from_hex(&user).map_err(|_| missing())?;

    let db = lock_db(&state.db)?;
    db.get_group(group_id)
        .map_err(|e| not_found_as(e, "Group not found"))?;
    if user_id != me {
        require_admin(db.get_membership(group_id, me)?)?;
    }

    if !db.remove_group_member(group_id, user_id)? {
        return Err(missing());
    }
    info!(group = %group_id, user = %user_id, by = %me, "Group member removed");

    Ok(Json(AckResponse {
        message: "Member removed",
    }))
}

fn require_admin(membership: Option<GroupMember>) -> Result<(), ServerError> {
    match membership {
        Some(m) if m.role == MemberRole::Admin => Ok(()),
        Some(_) => Err(ServerError::Forbidden(
            "Only group admins can manage members".into(),
        )),
        None => Err(ServerError::Forbidden(
            "You are not a member of this group".into(),
        )),
    }
}

// ─── Messages ───

async fn send_private_message(
    Caller(me): Caller,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SendPrivateRequest>,
) -> Result<Json<SentResponse>, ServerError> {
    let router = state.router.clone();
    let data =
        run_blocking(move || router.send_private(me, &req.receiver_id, &req.content)).await?;
    Ok(Json(SentResponse {
        message: "Message sent",
        data,
    }))
}

async fn send_group_message(
    Caller(me): Caller,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SendGroupRequest>,
) -> Result<Json<SentResponse>, ServerError> {
    let router = state.router.clone();
    let data = run_blocking(move || router.send_group(me, &req.group_id, &req.content)).await?;
    Ok(Json(SentResponse {
        message: "Message sent",
        data,
    }))
}

async fn private_history(
    Caller(me): Caller,
    State(state): State<AppState>,
    Path(other): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ServerError> {
    let router = state.router.clone();
    let page = query.page();
    let messages = run_blocking(move || router.private_history(me, &other, page)).await?;
    Ok(Json(HistoryResponse { messages }))
}

async fn group_history(
    Caller(me): Caller,
    State(state): State<AppState>,
    Path(group): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ServerError> {
    let router = state.router.clone();
    let page = query.page();
    let messages = run_blocking(move || router.group_history(me, &group, page)).await?;
    Ok(Json(HistoryResponse { messages }))
}

async fn mark_messages_read(
    Caller(_me): Caller,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<MarkReadRequest>,
) -> Result<Json<MarkedReadResponse>, ServerError> {
    let router = state.router.clone();
    let updated = run_blocking(move || router.mark_read(&req.message_ids)).await?;
    Ok(Json(MarkedReadResponse {
        message: "Messages marked as read",
        updated,
    }))
}

fn not_found_as(e: StoreError, what: &str) -> ServerError {
    match e {
        StoreError::NotFound => ServerError::NotFound(what.to_string()),
        other => other.into(),
    }
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
