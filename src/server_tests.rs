// src/server_tests.rs

#[cfg(test)]
mod tests {
    use crate::odoo_client::{OdooError, RecordGateway};
    use crate::planning_data::{TIMESHEET_FIELDS, TIMESHEET_MODEL};
    use crate::roster::{ManagerInfo, ManagerMapping};
    use crate::server::*;
    use crate::slot_query::{SLOT_FIELDS, SLOT_MODEL};
    use crate::test_support::{slot_record, timesheet_record, FakeGateway};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::extract::{Query, State};
    use axum::http::{Request, StatusCode};
    use axum::response::IntoResponse;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::runtime::Runtime;
    use tower::ServiceExt;

    struct FakeConnector {
        gateway: Option<Arc<FakeGateway>>,
        connects: AtomicUsize,
    }

    #[async_trait]
    impl GatewayConnector for FakeConnector {
        async fn connect(&self) -> Result<Arc<dyn RecordGateway>, OdooError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            match &self.gateway {
                Some(gateway) => Ok(gateway.clone()),
                None => Err(OdooError::AuthenticationFailed {
                    db: "acme".into(),
                    username: "bot@example.com".into(),
                }),
            }
        }
    }

    fn create_test_gateway() -> FakeGateway {
        FakeGateway::new()
            .with_fields(SLOT_MODEL, SLOT_FIELDS)
            .with_fields(TIMESHEET_MODEL, TIMESHEET_FIELDS)
            .with_records(
                SLOT_MODEL,
                vec![
                    slot_record(1, Some((3, "Ada")), "2024-05-02 09:00:00", "2024-05-02 17:00:00", 8.0, Some(5), Some(8), "Planned"),
                    slot_record(2, Some((4, "Bob")), "2024-05-03 09:00:00", "2024-05-03 12:00:00", 3.0, Some(5), Some(8), "Forecasted"),
                ],
            )
            .with_records(
                TIMESHEET_MODEL,
                vec![timesheet_record(100, Some((3, "Ada")), "2024-05-02", Some("2024-05-03 08:00:00"), 8.0, Some(8), Some(5), Some(21))],
            )
    }

    fn state_with(gateway: Option<FakeGateway>) -> (AppState, Arc<FakeConnector>) {
        let connector = Arc::new(FakeConnector {
            gateway: gateway.map(Arc::new),
            connects: AtomicUsize::new(0),
        });
        let mut managers = ManagerMapping::new();
        managers.insert(
            "Bob".into(),
            ManagerInfo {
                manager_name: "Mia".into(),
                manager_email: "mia@example.com".into(),
            },
        );
        let state = AppState {
            connector: connector.clone(),
            managers: Arc::new(managers),
        };
        (state, connector)
    }

    fn missing_params(end_date: &str, status: Option<&str>, tiers: Option<&str>) -> MissingParams {
        MissingParams {
            end_date: Some(end_date.into()),
            status: status.map(Into::into),
            tiers: tiers.map(Into::into),
            ..MissingParams::default()
        }
    }

    fn range_params(start: &str, end: &str) -> RangeParams {
        RangeParams {
            start_date: Some(start.into()),
            end_date: Some(end.into()),
            ..RangeParams::default()
        }
    }

    #[test]
    fn test_missing_report_handler() {
        let (state, connector) = state_with(Some(create_test_gateway()));

        let report = Runtime::new()
            .unwrap()
            .block_on(handle_missing_report(
                State(state),
                Query(missing_params("2024-05-04", Some("all"), None)),
            ))
            .unwrap()
            .0;

        assert_eq!(report.summary.missing_entries, 1);
        assert_eq!(report.records[0].designer, "Bob");
        assert_eq!(report.managers[0].manager, "Mia");
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_report_status_filter() {
        let (state, _) = state_with(Some(create_test_gateway()));

        let report = Runtime::new()
            .unwrap()
            .block_on(handle_missing_report(
                State(state),
                Query(missing_params("2024-05-04", Some("Planned"), None)),
            ))
            .unwrap()
            .0;

        assert_eq!(report.summary.missing_entries, 0);
        assert_eq!(report.summary.compliance_rate, 100.0);
    }

    #[test]
    fn test_bad_parameters_rejected_before_connecting() {
        let (state, connector) = state_with(Some(create_test_gateway()));
        let rt = Runtime::new().unwrap();

        let bad_date = rt
            .block_on(handle_missing_report(
                State(state.clone()),
                Query(missing_params("04/05/2024", None, None)),
            ))
            .unwrap_err();
        assert_eq!(bad_date.status_code(), StatusCode::BAD_REQUEST);

        let bad_status = rt
            .block_on(handle_missing_report(
                State(state.clone()),
                Query(missing_params("2024-05-04", Some("cancelled"), None)),
            ))
            .unwrap_err();
        assert_eq!(bad_status.status_code(), StatusCode::BAD_REQUEST);

        let bad_tiers = rt
            .block_on(handle_missing_report(
                State(state.clone()),
                Query(missing_params("2024-05-04", None, Some("fuzzy"))),
            ))
            .unwrap_err();
        assert_eq!(bad_tiers.status_code(), StatusCode::BAD_REQUEST);

        let reversed = rt
            .block_on(handle_timeliness_report(
                State(state),
                Query(range_params("2024-05-10", "2024-05-01")),
            ))
            .unwrap_err();
        assert_eq!(reversed.status_code(), StatusCode::BAD_REQUEST);

        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_authentication_failure_is_bad_gateway() {
        let (state, _) = state_with(None);

        let err = Runtime::new()
            .unwrap()
            .block_on(handle_missing_report(
                State(state),
                Query(missing_params("2024-05-04", None, None)),
            ))
            .unwrap_err();

        assert!(matches!(err, AppError::Odoo(OdooError::AuthenticationFailed { .. })));
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_timesheet_timeout_is_bad_gateway() {
        let gateway = create_test_gateway().timing_out_model(TIMESHEET_MODEL);
        let (state, _) = state_with(Some(gateway));
        let rt = Runtime::new().unwrap();

        let missing = rt
            .block_on(handle_missing_report(
                State(state.clone()),
                Query(missing_params("2024-05-04", Some("all"), None)),
            ))
            .unwrap_err();
        assert!(matches!(missing, AppError::Odoo(OdooError::Timeout { .. })));
        assert_eq!(missing.into_response().status(), StatusCode::BAD_GATEWAY);

        let timeliness = rt
            .block_on(handle_timeliness_report(
                State(state.clone()),
                Query(range_params("2024-05-01", "2024-05-04")),
            ))
            .unwrap_err();
        assert_eq!(timeliness.status_code(), StatusCode::BAD_GATEWAY);

        let trend = rt
            .block_on(handle_trend_report(
                State(state),
                Query(range_params("2024-05-01", "2024-05-04")),
            ))
            .unwrap_err();
        assert_eq!(trend.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_missing_report_drill_down_parameters() {
        let (state, _) = state_with(Some(create_test_gateway()));
        let params = MissingParams {
            project: Some("Unknown".into()),
            manager: Some("Mia".into()),
            ..missing_params("2024-05-04", Some("all"), None)
        };

        let report = Runtime::new()
            .unwrap()
            .block_on(handle_missing_report(State(state), Query(params)))
            .unwrap()
            .0;

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["drill_downs"][0]["by"], "project");
        assert_eq!(json["drill_downs"][0]["project"], "Unknown");
        assert_eq!(json["drill_downs"][0]["designers"][0]["designer"], "Bob");
        assert_eq!(json["drill_downs"][1]["by"], "team");
        assert_eq!(json["drill_downs"][1]["manager"], "Mia");
        assert_eq!(json["drill_downs"][1]["designers"][0]["designer"], "Bob");
    }

    #[test]
    fn test_error_status_codes() {
        let rpc = AppError::Odoo(OdooError::Rpc {
            message: "Access denied".into(),
        });
        assert_eq!(rpc.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let timeout = AppError::Odoo(OdooError::Timeout {
            model: SLOT_MODEL.into(),
            seconds: 30,
        });
        assert_eq!(timeout.status_code(), StatusCode::BAD_GATEWAY);

        let tls = AppError::TlsConfig("no key".into());
        assert_eq!(tls.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_timeliness_and_trend_handlers() {
        let (state, _) = state_with(Some(create_test_gateway()));
        let rt = Runtime::new().unwrap();

        let timeliness = rt
            .block_on(handle_timeliness_report(
                State(state.clone()),
                Query(range_params("2024-05-01", "2024-05-04")),
            ))
            .unwrap()
            .0;
        assert_eq!(timeliness.summary.total_entries, 1);
        assert_eq!(timeliness.records[0].delay_days, 1);

        let trend = rt
            .block_on(handle_trend_report(
                State(state),
                Query(range_params("2024-05-01", "2024-05-04")),
            ))
            .unwrap()
            .0;
        assert_eq!(trend.len(), 4);
        assert_eq!(trend[3].missing_count, 1);
    }

    #[test]
    fn test_router_serves_status_and_reports() {
        let (state, _) = state_with(Some(create_test_gateway()));
        let app = router(state);
        let rt = Runtime::new().unwrap();

        let status = rt
            .block_on(
                app.clone()
                    .oneshot(Request::get("/status").body(Body::empty()).unwrap()),
            )
            .unwrap();
        assert_eq!(status.status(), StatusCode::OK);

        let response = rt
            .block_on(
                app.oneshot(
                    Request::get("/api/report/missing?end_date=2024-05-04&status=Forecasted")
                        .body(Body::empty())
                        .unwrap(),
                ),
            )
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = rt
            .block_on(to_bytes(response.into_body(), usize::MAX))
            .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["shift_status"], "Forecasted");
        assert_eq!(json["records"][0]["Designer"], "Bob");
    }
}
