use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

use super::{parse_id, read_csv, read_int, read_string, AppState};
use crate::data::movies::SORT_SAFELIST;
use crate::data::{Filters, Movie, MovieQuery, Runtime};
use crate::error::AppResult;
use crate::validation::Validator;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMovieInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub runtime: Runtime,
    #[serde(default)]
    pub genres: Vec<String>,
}

/// Partial update: only fields present in the body change.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMovieInput {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<Runtime>,
    pub genres: Option<Vec<String>>,
}

pub async fn list_movies(
    State(state): State<AppState>,
    Query(qs): Query<HashMap<String, String>>,
) -> AppResult<impl IntoResponse> {
    let mut v = Validator::new();

    let query = MovieQuery {
        title: read_string(&qs, "title", ""),
        genres: read_csv(&qs, "genres"),
        filters: Filters {
            page: read_int(&qs, "page", 1, &mut v),
            page_size: read_int(&qs, "page_size", 20, &mut v),
            sort: read_string(&qs, "sort", "id"),
            sort_safelist: SORT_SAFELIST,
        },
    };

    query.filters.validate(&mut v);
    v.finish()?;

    let (movies, metadata) = state.models.movies.get_all(&query).await?;

    Ok(Json(json!({ "movies": movies, "metadata": metadata })))
}

pub async fn create_movie(
    State(state): State<AppState>,
    payload: Result<Json<CreateMovieInput>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload?;

    let mut movie = Movie::new(input.title, input.year, input.runtime, input.genres);

    let mut v = Validator::new();
    movie.validate(&mut v);
    v.finish()?;

    state.models.movies.insert(&mut movie).await?;

    let location = format!("/v1/movies/{}", movie.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(json!({ "movie": movie })),
    ))
}

pub async fn show_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    let movie = state.models.movies.get(id).await?;

    Ok(Json(json!({ "movie": movie })))
}

pub async fn update_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateMovieInput>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    let mut movie = state.models.movies.get(id).await?;

    let Json(input) = payload?;

    if let Some(title) = input.title {
        movie.title = title;
    }
    if let Some(year) = input.year {
        movie.year = year;
    }
    if let Some(runtime) = input.runtime {
        movie.runtime = runtime;
    }
    if let Some(genres) = input.genres {
        movie.genres = genres;
    }

    let mut v = Validator::new();
    movie.validate(&mut v);
    v.finish()?;

    state.models.movies.update(&mut movie).await?;

    Ok(Json(json!({ "movie": movie })))
}

pub async fn delete_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    state.models.movies.delete(id).await?;

    Ok(Json(json!({ "message": "movie successfully deleted" })))
}
