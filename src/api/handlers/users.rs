/*
 * Responsibility
 * - /user handlers: own record, own groups, lookup, create, delete
 * - Privilege gates beyond the route's minimum level live here
 *   (who may assign or delete which roles)
 */
use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::{Value, json};
use tracing::info;

use crate::api::dto::users::{CreateUserRequest, CreatedUserResponse, GroupsResponse, UserResponse};
use crate::api::extractors::CurrentUser;
use crate::domain::{NewUser, PrivilegeLevel, max_privilege};
use crate::error::AppError;
use crate::state::AppState;

const USER_NOT_FOUND: &str = "User ID does not exist";

pub async fn me(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
) -> Result<Json<UserResponse>, AppError> {
    let user = state
        .users
        .find_by_id(&auth.user.id)
        .await?
        .ok_or_else(|| AppError::not_found(USER_NOT_FOUND))?;

    Ok(Json(user.into()))
}

pub async fn groups(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
) -> Result<Json<GroupsResponse>, AppError> {
    let user = state
        .users
        .find_by_id(&auth.user.id)
        .await?
        .ok_or_else(|| AppError::not_found(USER_NOT_FOUND))?;

    Ok(Json(GroupsResponse { groups: user.groups }))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state
        .users
        .find_by_id(&user_id)
        .await?
        .ok_or_else(|| AppError::not_found(USER_NOT_FOUND))?;

    Ok(Json(user.into()))
}

pub async fn create_user(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<CreatedUserResponse>, AppError> {
    req.validate().map_err(AppError::bad_request)?;

    // Only admins may hand out roles at or above teacher.
    if auth.privilege_level < PrivilegeLevel::Admin
        && max_privilege(&req.role) >= PrivilegeLevel::Teacher
    {
        return Err(AppError::forbidden("Permission denied"));
    }

    let new_user = NewUser {
        username: req.username_or_default(),
        linked_email: req.linked_email.trim().to_string(),
        fullname: req.fullname.clone(),
        organization: req
            .organization
            .clone()
            .filter(|o| !o.trim().is_empty())
            .unwrap_or_else(|| auth.user.organization.clone()),
        role: req.role,
        created_by: auth.user.id.clone(),
    };

    let created = state.users.create(&new_user).await?;
    info!(user_id = %created.id, created_by = %auth.user.id, "user created");

    Ok(Json(CreatedUserResponse { id: created.id }))
}

pub async fn delete_user(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let target = state
        .users
        .find_by_id(&user_id)
        .await?
        .ok_or_else(|| AppError::not_found(USER_NOT_FOUND))?;

    if auth.privilege_level < PrivilegeLevel::Admin && target.privilege() >= PrivilegeLevel::Teacher {
        return Err(AppError::forbidden("Permission denied"));
    }

    if !state.users.delete(&target.id).await? {
        return Err(AppError::not_found(USER_NOT_FOUND));
    }
    info!(user_id = %target.id, deleted_by = %auth.user.id, "user deleted");

    Ok(Json(json!({})))
}
