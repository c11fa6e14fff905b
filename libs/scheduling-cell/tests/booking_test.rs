// Integration tests for the booking flow: wiremock stands in for the
// PostgREST storage API, mockall fakes the external collaborators.
use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use mockall::mock;
use std::sync::Arc;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use calendar_cell::{BusyInterval, CalendarError, CalendarProvider};
use meeting_room_cell::{MeetingRoom, RoomError, RoomPrivacy, RoomProvider};
use notification_cell::{Notice, NotificationDispatcher, NotifyError};
use scheduling_cell::models::{
    AppointmentStatus, BookSessionRequest, ConflictType, SchedulingError,
};
use scheduling_cell::BookingOrchestrator;
use shared_database::PostgrestClient;
use shared_utils::test_utils::{MockStorageResponses, TestConfig};

mock! {
    pub Rooms {}

    #[async_trait]
    impl RoomProvider for Rooms {
        async fn ensure_room(
            &self,
            name: &str,
            scheduled_at: DateTime<Utc>,
            duration_minutes: i32,
        ) -> Result<MeetingRoom, RoomError>;
        async fn get_room(&self, name: &str) -> Result<Option<MeetingRoom>, RoomError>;
        async fn delete_room(&self, name: &str) -> Result<bool, RoomError>;
    }
}

mock! {
    pub Calendar {}

    #[async_trait]
    impl CalendarProvider for Calendar {
        async fn busy_intervals(
            &self,
            therapist_id: Uuid,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<BusyInterval>, CalendarError>;
        async fn create_event(
            &self,
            calendar_id: &str,
            title: &str,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<String, CalendarError>;
        async fn delete_event(
            &self,
            calendar_id: &str,
            event_id: &str,
        ) -> Result<bool, CalendarError>;
    }
}

mock! {
    pub Notifier {}

    #[async_trait]
    impl NotificationDispatcher for Notifier {
        async fn dispatch(&self, notice: &Notice) -> Result<(), NotifyError>;
    }
}

fn test_room(name: &str) -> MeetingRoom {
    MeetingRoom {
        id: format!("room-{}", name),
        name: name.to_string(),
        url: format!("https://rooms.daily.co/{}", name),
        privacy: RoomPrivacy::Private,
    }
}

fn booking_request(therapist_id: Uuid, time: &str, session_type: &str) -> BookSessionRequest {
    BookSessionRequest {
        therapist_id,
        client_id: None,
        date: NaiveDate::from_ymd_opt(2025, 9, 17).unwrap(),
        time: time.to_string(),
        duration_minutes: 60,
        client_name: "Test Client".to_string(),
        client_email: "client@example.com".to_string(),
        client_phone: None,
        session_type: session_type.to_string(),
        notes: None,
        booked_by: "admin".to_string(),
        idempotency_key: None,
    }
}

fn orchestrator(
    server_uri: &str,
    rooms: MockRooms,
    calendar: MockCalendar,
    notifier: MockNotifier,
) -> BookingOrchestrator {
    let config = TestConfig::default()
        .with_storage_url(server_uri)
        .to_app_config();
    let storage = Arc::new(PostgrestClient::new(&config));

    BookingOrchestrator::new(
        &config,
        storage,
        Arc::new(rooms),
        Arc::new(calendar),
        Arc::new(notifier),
    )
    .unwrap()
}

async fn mount_no_conflicts(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/calendar_blocks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn overlapping_booking_is_rejected_referencing_the_existing_appointment() {
    let server = MockServer::start().await;
    let therapist_id = Uuid::new_v4();
    let existing_id = Uuid::new_v4();

    // Existing 12:00-13:00 UK appointment (11:00-12:00 UTC in September).
    let existing_start = Utc.with_ymd_and_hms(2025, 9, 17, 11, 0, 0).unwrap();
    let existing_end = Utc.with_ymd_and_hms(2025, 9, 17, 12, 0, 0).unwrap();
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param(
            "primary_therapist_id",
            format!("eq.{}", therapist_id),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            MockStorageResponses::appointment_row(
                existing_id,
                therapist_id,
                existing_start,
                existing_end,
                "scheduled",
            )
        ])))
        .mount(&server)
        .await;

    // Rooms, calendar and notifier carry no expectations: reaching any of
    // them after a rejected conflict check is a test failure.
    let orchestrator = orchestrator(
        &server.uri(),
        MockRooms::new(),
        MockCalendar::new(),
        MockNotifier::new(),
    );

    let result = orchestrator
        .book_session(booking_request(therapist_id, "12:30", "Therapy Session"))
        .await;

    let err = result.unwrap_err();
    let conflict = assert_matches!(err, SchedulingError::ConflictDetected(c) => c);
    assert_eq!(conflict.conflict_type, ConflictType::AppointmentConflict);
    assert_eq!(conflict.conflicting_id, Some(existing_id.to_string()));
}

#[tokio::test]
async fn successful_booking_provisions_room_persists_and_notifies() {
    let server = MockServer::start().await;
    let therapist_id = Uuid::new_v4();

    mount_no_conflicts(&server).await;

    let created_id = Uuid::new_v4();
    let start = Utc.with_ymd_and_hms(2025, 9, 17, 11, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 9, 17, 12, 0, 0).unwrap();
    let created_row =
        MockStorageResponses::appointment_row(created_id, therapist_id, start, end, "scheduled");

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(serde_json::json!({
            "primary_therapist_id": therapist_id,
            "scheduled_at": start.to_rfc3339(),
            "end_time": end.to_rfc3339(),
            "status": "scheduled"
        })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(serde_json::json!([created_row.clone()])),
        )
        .expect(1)
        .mount(&server)
        .await;

    // Calendar event id gets patched onto the row afterwards.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", created_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([created_row])))
        .mount(&server)
        .await;

    let mut rooms = MockRooms::new();
    rooms
        .expect_ensure_room()
        .withf(|name, _, duration| name.starts_with("session-") && *duration == 60)
        .times(1)
        .returning(|name, _, _| Ok(test_room(name)));

    let mut calendar = MockCalendar::new();
    calendar
        .expect_busy_intervals()
        .times(1)
        .returning(|_, _, _| Ok(vec![]));
    calendar
        .expect_create_event()
        .times(1)
        .returning(|_, _, _, _| Ok("cal-evt-1".to_string()));

    let mut notifier = MockNotifier::new();
    notifier
        .expect_dispatch()
        .withf(|notice| matches!(notice, Notice::BookingConfirmed { .. }))
        .times(1)
        .returning(|_| Ok(()));

    let orchestrator = orchestrator(&server.uri(), rooms, calendar, notifier);

    let appointment = orchestrator
        .book_session(booking_request(therapist_id, "12:00", "Therapy Session"))
        .await
        .unwrap();

    assert_eq!(appointment.id, created_id);
    assert_eq!(appointment.status, AppointmentStatus::Scheduled);
}

#[tokio::test]
async fn session_type_routes_events_to_the_matching_calendar() {
    // Admin-routed sessions share the generic meeting link and never touch
    // the room provider; therapist-owned sessions get a dedicated room.
    for (session_type, admin_routed) in [("Introduction Call", true), ("Therapy Session", false)] {
        let server = MockServer::start().await;
        let therapist_id = Uuid::new_v4();

        mount_no_conflicts(&server).await;

        let created_id = Uuid::new_v4();
        let start = Utc.with_ymd_and_hms(2025, 9, 17, 11, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 9, 17, 12, 0, 0).unwrap();
        let row = MockStorageResponses::appointment_row(
            created_id,
            therapist_id,
            start,
            end,
            "scheduled",
        );
        let insert = Mock::given(method("POST")).and(path("/rest/v1/appointments"));
        let insert = if admin_routed {
            insert.and(body_partial_json(serde_json::json!({
                "meeting_url": "https://meet.example.com/intake",
                "meeting_provider_room_id": null,
            })))
        } else {
            insert
        };
        insert
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!([row.clone()])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/appointments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([row])))
            .mount(&server)
            .await;

        // An unexpected ensure_room call on the admin route panics the mock.
        let mut rooms = MockRooms::new();
        if !admin_routed {
            rooms
                .expect_ensure_room()
                .times(1)
                .returning(|name, _, _| Ok(test_room(name)));
        }

        let expected = if admin_routed {
            "admin-shared-calendar".to_string()
        } else {
            format!("therapist-{}", therapist_id)
        };
        let mut calendar = MockCalendar::new();
        calendar
            .expect_busy_intervals()
            .returning(|_, _, _| Ok(vec![]));
        calendar
            .expect_create_event()
            .withf(move |calendar_id, _, _, _| calendar_id == expected)
            .times(1)
            .returning(|_, _, _, _| Ok("cal-evt".to_string()));

        let mut notifier = MockNotifier::new();
        notifier.expect_dispatch().returning(|_| Ok(()));

        let orchestrator = orchestrator(&server.uri(), rooms, calendar, notifier);
        orchestrator
            .book_session(booking_request(therapist_id, "12:00", session_type))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn lost_insert_race_surfaces_as_overlap_and_tears_down_the_room() {
    let server = MockServer::start().await;
    let therapist_id = Uuid::new_v4();

    mount_no_conflicts(&server).await;

    // The exclusion constraint fires on insert despite the clean check.
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(MockStorageResponses::exclusion_violation_body()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut rooms = MockRooms::new();
    rooms
        .expect_ensure_room()
        .returning(|name, _, _| Ok(test_room(name)));
    rooms
        .expect_delete_room()
        .withf(|name| name.starts_with("session-"))
        .times(1)
        .returning(|_| Ok(true));

    let mut calendar = MockCalendar::new();
    calendar
        .expect_busy_intervals()
        .returning(|_, _, _| Ok(vec![]));

    let orchestrator = orchestrator(&server.uri(), rooms, calendar, MockNotifier::new());

    let result = orchestrator
        .book_session(booking_request(therapist_id, "12:00", "Therapy Session"))
        .await;

    assert_matches!(result, Err(SchedulingError::AppointmentOverlap));
}

#[tokio::test]
async fn external_calendar_outage_does_not_block_but_database_conflict_does() {
    // Calendar down, database clean: booking proceeds (soft-fail-open).
    let server = MockServer::start().await;
    let therapist_id = Uuid::new_v4();

    mount_no_conflicts(&server).await;

    let created_id = Uuid::new_v4();
    let start = Utc.with_ymd_and_hms(2025, 9, 17, 11, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 9, 17, 12, 0, 0).unwrap();
    let row =
        MockStorageResponses::appointment_row(created_id, therapist_id, start, end, "scheduled");
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!([row.clone()])))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([row])))
        .mount(&server)
        .await;

    let mut rooms = MockRooms::new();
    rooms
        .expect_ensure_room()
        .returning(|name, _, _| Ok(test_room(name)));

    let mut calendar = MockCalendar::new();
    calendar.expect_busy_intervals().returning(|_, _, _| {
        Err(CalendarError::ApiError {
            message: "upstream timeout".to_string(),
        })
    });
    // Event mirroring also fails; booking still stands.
    calendar.expect_create_event().returning(|_, _, _, _| {
        Err(CalendarError::ApiError {
            message: "upstream timeout".to_string(),
        })
    });

    let mut notifier = MockNotifier::new();
    notifier.expect_dispatch().returning(|_| Ok(()));

    let degraded_orchestrator = orchestrator(&server.uri(), rooms, calendar, notifier);
    let appointment = degraded_orchestrator
        .book_session(booking_request(therapist_id, "12:00", "Therapy Session"))
        .await
        .unwrap();
    assert_eq!(appointment.id, created_id);

    // Same outage, but with a database conflict: still hard-blocked.
    let blocked_server = MockServer::start().await;
    let existing_id = Uuid::new_v4();
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            MockStorageResponses::appointment_row(
                existing_id,
                therapist_id,
                start,
                end,
                "scheduled",
            )
        ])))
        .mount(&blocked_server)
        .await;

    let orchestrator = orchestrator(
        &blocked_server.uri(),
        MockRooms::new(),
        MockCalendar::new(),
        MockNotifier::new(),
    );
    let result = orchestrator
        .book_session(booking_request(therapist_id, "12:00", "Therapy Session"))
        .await;
    assert_matches!(result, Err(SchedulingError::ConflictDetected(_)));
}

#[tokio::test]
async fn notification_failure_degrades_but_does_not_fail_the_booking() {
    let server = MockServer::start().await;
    let therapist_id = Uuid::new_v4();

    mount_no_conflicts(&server).await;

    let created_id = Uuid::new_v4();
    let start = Utc.with_ymd_and_hms(2025, 9, 17, 11, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 9, 17, 12, 0, 0).unwrap();
    let row =
        MockStorageResponses::appointment_row(created_id, therapist_id, start, end, "scheduled");
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!([row.clone()])))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([row])))
        .mount(&server)
        .await;

    let mut rooms = MockRooms::new();
    rooms
        .expect_ensure_room()
        .returning(|name, _, _| Ok(test_room(name)));

    let mut calendar = MockCalendar::new();
    calendar
        .expect_busy_intervals()
        .returning(|_, _, _| Ok(vec![]));
    calendar
        .expect_create_event()
        .returning(|_, _, _, _| Ok("cal-evt".to_string()));

    let mut notifier = MockNotifier::new();
    notifier.expect_dispatch().times(1).returning(|_| {
        Err(NotifyError::ApiError {
            message: "mailer down".to_string(),
        })
    });

    let orchestrator = orchestrator(&server.uri(), rooms, calendar, notifier);
    let appointment = orchestrator
        .book_session(booking_request(therapist_id, "12:00", "Therapy Session"))
        .await
        .unwrap();
    assert_eq!(appointment.id, created_id);
}

#[tokio::test]
async fn cancelling_an_already_cancelled_session_is_a_no_op() {
    let server = MockServer::start().await;
    let therapist_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();

    let start = Utc.with_ymd_and_hms(2025, 9, 17, 11, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 9, 17, 12, 0, 0).unwrap();
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            MockStorageResponses::appointment_row(
                appointment_id,
                therapist_id,
                start,
                end,
                "cancelled",
            )
        ])))
        .mount(&server)
        .await;

    // No room teardown, no patch, no notification on the repeat cancel.
    let orchestrator = orchestrator(
        &server.uri(),
        MockRooms::new(),
        MockCalendar::new(),
        MockNotifier::new(),
    );

    let appointment = orchestrator
        .cancel_session(appointment_id, None)
        .await
        .unwrap();
    assert_eq!(appointment.status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn cancellation_tears_down_room_and_notifies_once() {
    let server = MockServer::start().await;
    let therapist_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();

    let start = Utc.with_ymd_and_hms(2025, 9, 17, 11, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 9, 17, 12, 0, 0).unwrap();
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            MockStorageResponses::appointment_row(
                appointment_id,
                therapist_id,
                start,
                end,
                "scheduled",
            )
        ])))
        .mount(&server)
        .await;

    let cancelled_row = MockStorageResponses::appointment_row(
        appointment_id,
        therapist_id,
        start,
        end,
        "cancelled",
    );
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .and(body_partial_json(serde_json::json!({ "status": "cancelled" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([cancelled_row])))
        .expect(1)
        .mount(&server)
        .await;

    let mut rooms = MockRooms::new();
    let expected_room = format!("session-{}", appointment_id);
    rooms
        .expect_delete_room()
        .withf(move |name| name == expected_room)
        .times(1)
        .returning(|_| Ok(true));

    let mut notifier = MockNotifier::new();
    notifier
        .expect_dispatch()
        .withf(|notice| matches!(notice, Notice::BookingCancelled { .. }))
        .times(1)
        .returning(|_| Ok(()));

    let orchestrator = orchestrator(&server.uri(), rooms, MockCalendar::new(), notifier);

    let appointment = orchestrator
        .cancel_session(appointment_id, Some("client request".to_string()))
        .await
        .unwrap();
    assert_eq!(appointment.status, AppointmentStatus::Cancelled);
}
