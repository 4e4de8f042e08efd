use crate::{ApiError, Result};
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use lookout_core::{
    ClusterNamespace, EventAction, ExecutionStatus, InterceptedEventQuery, PageRequest, SortOrder,
    WatcherOrderBy, WatcherQuery, SYSTEM_USER_ID,
};
use serde::Deserialize;
use std::str::FromStr;

/// Header carrying the acting user id
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Acting user; the system user when the header is absent
pub fn user_id(headers: &HeaderMap) -> Result<u64> {
    let Some(raw) = headers.get(USER_ID_HEADER) else {
        return Ok(SYSTEM_USER_ID);
    };
    raw.to_str()
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|id| *id != 0)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid {} header", USER_ID_HEADER)))
}

/// Non-empty items of a comma-separated parameter
fn split_list(raw: Option<&str>) -> impl Iterator<Item = &str> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn parse_list<T>(raw: Option<&str>, field: &str) -> Result<Vec<T>>
where
    T: FromStr<Err = String>,
{
    split_list(raw)
        .map(|item| {
            item.parse()
                .map_err(|e| ApiError::BadRequest(format!("invalid {}: {}", field, e)))
        })
        .collect()
}

fn parse_number<T: FromStr>(raw: Option<&str>, field: &str) -> Result<Option<T>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("invalid {} '{}'", field, s))),
        None => Ok(None),
    }
}

/// RFC 3339 or RFC 2822 timestamp
pub fn parse_time(raw: &str, field: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| {
            ApiError::BadRequest(format!(
                "invalid {} '{}': expected an RFC 3339 or RFC 2822 timestamp",
                field, raw
            ))
        })
}

fn parse_page(offset: Option<&str>, size: Option<&str>) -> Result<PageRequest> {
    Ok(PageRequest::new(
        parse_number(offset, "offset")?.unwrap_or(0),
        parse_number(size, "size")?.unwrap_or(PageRequest::DEFAULT_SIZE),
    ))
}

fn parse_order(raw: Option<&str>) -> Result<Option<SortOrder>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s.parse().map(Some).map_err(ApiError::BadRequest),
        None => Ok(None),
    }
}

/// Query string of `GET /k8s/watcher`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherListParams {
    pub search: Option<String>,
    pub order_by: Option<String>,
    pub order: Option<String>,
    pub offset: Option<String>,
    pub size: Option<String>,
}

impl WatcherListParams {
    /// Names sort ascending by default, trigger times most recent first
    pub fn into_query(self) -> Result<WatcherQuery> {
        let order_by = match self.order_by.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => s.parse().map_err(ApiError::BadRequest)?,
            None => WatcherOrderBy::Name,
        };
        let order = parse_order(self.order.as_deref())?.unwrap_or(match order_by {
            WatcherOrderBy::Name => SortOrder::Asc,
            WatcherOrderBy::TriggeredAt => SortOrder::Desc,
        });

        Ok(WatcherQuery {
            search: self.search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            order_by,
            order,
            page: parse_page(self.offset.as_deref(), self.size.as_deref())?,
        })
    }
}

/// Query string of `GET /scoop/intercepted-events`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptedEventParams {
    pub from: Option<String>,
    pub to: Option<String>,
    pub watchers: Option<String>,
    pub clusters: Option<String>,
    /// `<clusterId>_<namespace>` pairs; a bare cluster id selects the whole cluster
    pub namespaces: Option<String>,
    pub execution_statuses: Option<String>,
    pub actions: Option<String>,
    pub offset: Option<String>,
    pub size: Option<String>,
    pub sort: Option<String>,
    pub search_string: Option<String>,
}

impl InterceptedEventParams {
    /// Newest events first unless `sort=asc`
    pub fn into_query(self) -> Result<InterceptedEventQuery> {
        let from = self.from.as_deref().filter(|s| !s.trim().is_empty());
        let to = self.to.as_deref().filter(|s| !s.trim().is_empty());
        let from = from.map(|s| parse_time(s, "from")).transpose()?;
        let to = to.map(|s| parse_time(s, "to")).transpose()?;
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(ApiError::BadRequest("from must not be after to".to_string()));
            }
        }

        let mut cluster_ids: Vec<u64> = split_list(self.clusters.as_deref())
            .map(|s| parse_number(Some(s), "clusters").map(|id| id.unwrap_or_default()))
            .collect::<Result<_>>()?;
        let mut cluster_namespaces = Vec::new();
        for item in split_list(self.namespaces.as_deref()) {
            if item.contains('_') {
                let pair: ClusterNamespace = item
                    .parse()
                    .map_err(|e| ApiError::BadRequest(format!("invalid namespaces: {}", e)))?;
                cluster_namespaces.push(pair);
            } else if let Some(id) = parse_number(Some(item), "namespaces")? {
                cluster_ids.push(id);
            }
        }
        cluster_ids.sort_unstable();
        cluster_ids.dedup();

        Ok(InterceptedEventQuery {
            page: parse_page(self.offset.as_deref(), self.size.as_deref())?,
            sort_order: parse_order(self.sort.as_deref())?.unwrap_or(SortOrder::Desc),
            search_string: self
                .search_string
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            from,
            to,
            cluster_ids,
            cluster_namespaces,
            watcher_names: split_list(self.watchers.as_deref()).map(str::to_string).collect(),
            statuses: parse_list::<ExecutionStatus>(
                self.execution_statuses.as_deref(),
                "executionStatuses",
            )?,
            actions: parse_list::<EventAction>(self.actions.as_deref(), "actions")?,
        })
    }
}

/// `?clusterId=` of the agent-facing endpoints
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterParams {
    pub cluster_id: Option<String>,
}

impl ClusterParams {
    pub fn cluster_id(&self) -> Result<u64> {
        parse_number(self.cluster_id.as_deref(), "clusterId")?
            .ok_or_else(|| ApiError::BadRequest("clusterId is required".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_user_id_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(user_id(&headers).unwrap(), SYSTEM_USER_ID);

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("42"));
        assert_eq!(user_id(&headers).unwrap(), 42);

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("bob"));
        assert!(matches!(user_id(&headers), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_parse_time_formats() {
        let rfc3339 = parse_time("2026-03-01T12:00:00Z", "from").unwrap();
        let rfc2822 = parse_time("Sun, 01 Mar 2026 12:00:00 +0000", "from").unwrap();
        assert_eq!(rfc3339, rfc2822);
        assert!(parse_time("yesterday", "from").is_err());
    }

    #[test]
    fn test_watcher_list_defaults() {
        let query = WatcherListParams::default().into_query().unwrap();
        assert_eq!(query.order_by, WatcherOrderBy::Name);
        assert_eq!(query.order, SortOrder::Asc);
        assert_eq!(query.page, PageRequest::default());

        let query = WatcherListParams {
            order_by: Some("triggeredAt".into()),
            ..Default::default()
        }
        .into_query()
        .unwrap();
        assert_eq!(query.order, SortOrder::Desc);

        let err = WatcherListParams {
            order_by: Some("createdOn".into()),
            ..Default::default()
        }
        .into_query()
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_intercepted_event_params() {
        let query = InterceptedEventParams {
            from: Some("2026-03-01T00:00:00Z".into()),
            clusters: Some("2, 1".into()),
            namespaces: Some("1_ns1,3".into()),
            watchers: Some("prod-pod-evictions,".into()),
            execution_statuses: Some("Success,Failure".into()),
            actions: Some("DELETE".into()),
            offset: Some("20".into()),
            size: Some("10".into()),
            ..Default::default()
        }
        .into_query()
        .unwrap();

        assert_eq!(query.sort_order, SortOrder::Desc);
        assert_eq!(query.cluster_ids, vec![1, 2, 3]);
        assert_eq!(
            query.cluster_namespaces,
            vec![ClusterNamespace {
                cluster_id: 1,
                namespace: "ns1".into()
            }]
        );
        assert_eq!(query.watcher_names, vec!["prod-pod-evictions"]);
        assert_eq!(query.statuses, vec![ExecutionStatus::Success, ExecutionStatus::Failure]);
        assert_eq!(query.actions, vec![EventAction::Delete]);
        assert_eq!(query.page, PageRequest::new(20, 10));
        assert!(query.to.is_none());
    }

    #[test]
    fn test_intercepted_event_params_rejects_garbage() {
        for params in [
            InterceptedEventParams {
                size: Some("-1".into()),
                ..Default::default()
            },
            InterceptedEventParams {
                actions: Some("CREATE".into()),
                ..Default::default()
            },
            InterceptedEventParams {
                from: Some("2026-03-02T00:00:00Z".into()),
                to: Some("2026-03-01T00:00:00Z".into()),
                ..Default::default()
            },
            InterceptedEventParams {
                namespaces: Some("x_ns1".into()),
                ..Default::default()
            },
        ] {
            assert!(matches!(params.into_query(), Err(ApiError::BadRequest(_))));
        }
    }

    #[test]
    fn test_cluster_id_required() {
        assert!(ClusterParams::default().cluster_id().is_err());
        let params = ClusterParams {
            cluster_id: Some("7".into()),
        };
        assert_eq!(params.cluster_id().unwrap(), 7);
    }
}
