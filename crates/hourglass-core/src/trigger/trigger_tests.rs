    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, h, m, s).unwrap()
    }

    fn ms(n: i64) -> TimeDelta {
        TimeDelta::milliseconds(n)
    }

    // ========================================================================
    // FixedTime
    // ========================================================================

    #[test]
    fn test_fixed_fire_time_after() {
        let trigger = Trigger::fixed_time("t1", "j1", at(10, 0, 0));
        assert_eq!(trigger.fire_time_after(at(9, 0, 0)), Some(at(10, 0, 0)));
        assert_eq!(trigger.fire_time_after(at(10, 0, 0)), None);
        assert_eq!(trigger.fire_time_after(at(11, 0, 0)), None);
    }

    #[test]
    fn test_fixed_first_arming_at_now() {
        let now = Utc::now();
        let mut trigger = Trigger::fixed_time("t1", "j1", now);

        // Registration happens a moment after the start time was taken.
        let next = trigger.compute_next_fire_time(now + ms(3));
        assert_eq!(next, Some(now));
    }

    #[test]
    fn test_fixed_fires_once() {
        let mut trigger = Trigger::fixed_time("t1", "j1", at(10, 0, 0));
        trigger.compute_next_fire_time(at(9, 0, 0));

        let next = trigger.trigger_fired(at(10, 0, 0));
        assert_eq!(next, None);
        assert_eq!(trigger.previous_fire_time, Some(at(10, 0, 0)));
        assert!(trigger.is_exhausted());
    }

    #[test]
    fn test_fixed_beyond_end_never_fires() {
        let mut trigger =
            Trigger::fixed_time("t1", "j1", at(10, 0, 0)).with_end_time(at(9, 0, 0));
        assert_eq!(trigger.compute_next_fire_time(at(8, 0, 0)), None);
    }

    #[test]
    fn test_fixed_overdue_slot_is_skipped() {
        let mut trigger = Trigger::fixed_time("t1", "j1", at(10, 0, 0));
        trigger.compute_next_fire_time(at(9, 0, 0));
        assert_eq!(trigger.compute_next_fire_time(at(11, 0, 0)), None);
    }

    // ========================================================================
    // Fixed rate
    // ========================================================================

    #[test]
    fn test_rate_first_fire_uses_initial_delay() {
        let mut trigger = Trigger::fixed_rate("t1", "j1", Duration::from_millis(500))
            .with_initial_delay(Duration::from_secs(2));
        assert_eq!(trigger.compute_next_fire_time(at(10, 0, 0)), Some(at(10, 0, 2)));

        // Subsequent slots use the fixed offset.
        assert_eq!(trigger.trigger_fired(at(10, 0, 2)), Some(at(10, 0, 2) + ms(500)));
    }

    #[test]
    fn test_rate_keeps_cadence_despite_slow_runs() {
        let t0 = at(10, 0, 0);
        let mut trigger = Trigger::fixed_rate("t1", "j1", Duration::from_millis(500));
        trigger.next_fire_time = Some(t0);

        // Claimed slightly late, next slot still comes from the scheduled slot.
        assert_eq!(trigger.trigger_fired(t0 + ms(7)), Some(t0 + ms(500)));

        // The run takes 1500ms; completion does not move the grid.
        trigger.set_last_completed_time(t0 + ms(1500));
        assert_eq!(trigger.next_fire_time, Some(t0 + ms(500)));

        // Firing late skips the missed slots but stays on the grid.
        assert_eq!(trigger.trigger_fired(t0 + ms(1600)), Some(t0 + ms(2000)));
    }

    #[test]
    fn test_rate_aligns_to_start_time() {
        let mut trigger = Trigger::fixed_rate("t1", "j1", Duration::from_secs(60))
            .with_initial_delay(Duration::from_secs(60))
            .with_start_time(at(10, 5, 30));
        // 10:01 is before the start, so it advances by the offset to 10:06.
        assert_eq!(trigger.compute_next_fire_time(at(10, 0, 0)), Some(at(10, 6, 0)));
    }

    #[test]
    fn test_rate_zero_initial_delay_aligns_to_start() {
        let mut trigger = Trigger::fixed_rate("t1", "j1", Duration::from_secs(60))
            .with_start_time(at(10, 5, 0));
        assert_eq!(trigger.compute_next_fire_time(at(10, 0, 0)), Some(at(10, 5, 0)));
    }

    #[test]
    fn test_rate_exhausts_at_end_time() {
        let mut trigger = Trigger::fixed_rate("t1", "j1", Duration::from_secs(60))
            .with_end_time(at(10, 2, 0));
        trigger.next_fire_time = Some(at(10, 1, 0));

        assert_eq!(trigger.trigger_fired(at(10, 1, 0)), Some(at(10, 2, 0)));
        assert_eq!(trigger.trigger_fired(at(10, 2, 0)), None);
    }

    #[test]
    fn test_rate_recovery_keeps_grid() {
        let mut trigger = Trigger::fixed_rate("t1", "j1", Duration::from_secs(10));
        trigger.next_fire_time = Some(at(10, 0, 0));

        // Overdue by 35s: the next grid slot after now is 10:00:40.
        assert_eq!(trigger.compute_next_fire_time(at(10, 0, 35)), Some(at(10, 0, 40)));
        // An armed future slot is kept as is.
        assert_eq!(trigger.compute_next_fire_time(at(10, 0, 36)), Some(at(10, 0, 40)));
    }

    // ========================================================================
    // Fixed delay
    // ========================================================================

    #[test]
    fn test_delay_parks_until_completion() {
        let t0 = at(10, 0, 0);
        let mut trigger = Trigger::fixed_delay("t1", "j1", Duration::from_millis(500));
        trigger.next_fire_time = Some(t0);

        assert_eq!(trigger.trigger_fired(t0), Some(NEVER));
        assert!(trigger.is_parked());
        assert_eq!(trigger.previous_fire_time, Some(t0));

        // Still parked when claimed again before any completion.
        assert_eq!(trigger.trigger_fired(t0 + ms(100)), Some(NEVER));
        assert_eq!(trigger.previous_fire_time, Some(t0));

        trigger.set_last_completed_time(t0 + ms(1500));
        assert_eq!(trigger.next_fire_time, Some(t0 + ms(2000)));
    }

    #[test]
    fn test_delay_parks_again_after_next_fire() {
        let t0 = at(10, 0, 0);
        let mut trigger = Trigger::fixed_delay("t1", "j1", Duration::from_millis(500));
        trigger.next_fire_time = Some(t0);
        trigger.trigger_fired(t0);
        trigger.set_last_completed_time(t0 + ms(200));

        // The completion is older than the newly armed slot.
        assert_eq!(trigger.trigger_fired(t0 + ms(700)), Some(NEVER));
    }

    #[test]
    fn test_delay_parked_without_completion_is_recovered() {
        let t0 = at(10, 0, 0);
        let mut trigger = Trigger::fixed_delay("t1", "j1", Duration::from_secs(10));
        trigger.next_fire_time = Some(t0);
        trigger.trigger_fired(t0);

        // A plain recompute keeps waiting for the completion.
        let mut waiting = trigger.clone();
        assert_eq!(waiting.compute_next_fire_time(at(11, 0, 0)), Some(NEVER));

        let now = at(11, 0, 5);
        let next = trigger.recover_next_fire_time(now).unwrap();
        assert_eq!(next, at(11, 0, 10));
        assert!(!trigger.is_parked());
        assert_eq!(trigger.previous_fire_time, Some(t0));
    }

    #[test]
    fn test_recover_next_fire_time_matches_compute_when_not_parked() {
        let mut recovered = Trigger::fixed_rate("t1", "j1", Duration::from_secs(10));
        recovered.next_fire_time = Some(at(10, 0, 0));
        let mut computed = recovered.clone();

        let now = at(10, 1, 5);
        assert_eq!(
            recovered.recover_next_fire_time(now),
            computed.compute_next_fire_time(now)
        );
    }

    #[test]
    fn test_delay_recovery_rearms_overdue_slot() {
        let mut trigger = Trigger::fixed_delay("t1", "j1", Duration::from_secs(10));
        trigger.next_fire_time = Some(at(10, 0, 0));
        let next = trigger.compute_next_fire_time(at(10, 1, 5)).unwrap();
        assert!(next > at(10, 1, 5));
        assert_ne!(next, NEVER);
    }

    // ========================================================================
    // Cron
    // ========================================================================

    #[test]
    fn test_cron_every_minute() {
        let trigger = Trigger::cron("t1", "j1", "0 * * * * *", "UTC").unwrap();
        assert_eq!(trigger.fire_time_after(at(10, 0, 30)), Some(at(10, 1, 0)));
        assert_eq!(trigger.fire_time_after(at(10, 1, 0)), Some(at(10, 2, 0)));
    }

    #[test]
    fn test_cron_five_field_expression() {
        let trigger = Trigger::cron("t1", "j1", "*/15 * * * *", "UTC").unwrap();
        assert_eq!(trigger.fire_time_after(at(10, 1, 0)), Some(at(10, 15, 0)));
    }

    #[test]
    fn test_cron_timezone() {
        let trigger = Trigger::cron("t1", "j1", "0 0 9 * * *", "America/New_York").unwrap();
        // 09:00 EST is 14:00 UTC in January.
        assert_eq!(trigger.fire_time_after(at(10, 0, 0)), Some(at(14, 0, 0)));
    }

    #[test]
    fn test_cron_respects_start_time() {
        let trigger = Trigger::cron("t1", "j1", "0 * * * * *", "UTC")
            .unwrap()
            .with_start_time(at(12, 30, 10));
        assert_eq!(trigger.fire_time_after(at(10, 0, 0)), Some(at(12, 31, 0)));
    }

    #[test]
    fn test_cron_exhausts_after_end_time() {
        let trigger = Trigger::cron("t1", "j1", "0 * * * * *", "UTC")
            .unwrap()
            .with_end_time(at(10, 5, 0));
        assert_eq!(trigger.fire_time_after(at(10, 4, 0)), Some(at(10, 5, 0)));
        assert_eq!(trigger.fire_time_after(at(10, 5, 0)), None);
    }

    #[test]
    fn test_cron_trigger_fired_skips_missed_slots() {
        let mut trigger = Trigger::cron("t1", "j1", "0 * * * * *", "UTC").unwrap();
        trigger.next_fire_time = Some(at(10, 0, 0));
        assert_eq!(trigger.trigger_fired(at(10, 7, 30)), Some(at(10, 8, 0)));
        assert_eq!(trigger.previous_fire_time, Some(at(10, 0, 0)));
    }

    #[test]
    fn test_cron_invalid_expression() {
        let result = Trigger::cron("t1", "j1", "not a cron", "UTC");
        assert!(matches!(result, Err(SchedulerError::InvalidCronExpression { .. })));
    }

    #[test]
    fn test_cron_invalid_timezone() {
        let result = Trigger::cron("t1", "j1", "0 * * * * *", "Mars/Olympus");
        assert!(matches!(result, Err(SchedulerError::InvalidTimezone(_))));
    }

    // ========================================================================
    // Shared properties
    // ========================================================================

    #[test]
    fn test_trigger_fired_result_is_after_timestamp() {
        let now = at(10, 0, 0);
        let mut triggers = vec![
            Trigger::fixed_time("fixed", "j", now),
            Trigger::fixed_rate("rate", "j", Duration::from_millis(250)),
            Trigger::fixed_rate("rate-bounded", "j", Duration::from_secs(1))
                .with_end_time(now + ms(2500)),
            Trigger::cron("cron", "j", "*/5 * * * * *", "UTC").unwrap(),
        ];

        for trigger in &mut triggers {
            trigger.compute_next_fire_time(now);
            for step in 1..20 {
                let fired_at = now + ms(step * 333);
                if let Some(next) = trigger.trigger_fired(fired_at) {
                    assert!(next > fired_at, "{} produced {} <= {}", trigger.key, next, fired_at);
                }
            }
        }
    }

    #[test]
    fn test_validate() {
        assert!(Trigger::fixed_time("t", "j", Utc::now()).validate().is_ok());
        assert!(Trigger::new("t", "j", TriggerKind::FixedTime).validate().is_err());
        assert!(Trigger::fixed_rate("t", "j", Duration::ZERO).validate().is_err());
        assert!(Trigger::fixed_rate("", "j", Duration::from_secs(1)).validate().is_err());
        assert!(Trigger::fixed_rate("t", "j", Duration::from_secs(1))
            .with_start_time(at(10, 0, 0))
            .with_end_time(at(9, 0, 0))
            .validate()
            .is_err());
    }

    #[test]
    fn test_kind_serialization() {
        let kind = Trigger::cron("t", "j", "0 0 * * * *", "Europe/Paris").unwrap().kind;
        let json = serde_json::to_string(&kind).unwrap();
        assert!(json.contains("\"type\":\"cron\""));
        assert!(json.contains("Europe/Paris"));
        let parsed: TriggerKind = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, kind);

        let bad = r#"{"type":"cron","expression":"nope"}"#;
        assert!(serde_json::from_str::<TriggerKind>(bad).is_err());
    }

    #[test]
    fn test_type_tags() {
        assert_eq!(TriggerKind::FixedTime.type_tag(), "fixed_time");
        assert_eq!(
            Trigger::fixed_delay("t", "j", Duration::from_secs(1)).kind.type_tag(),
            "fixed_delay"
        );
    }

    #[test]
    fn test_never_millis_roundtrip() {
        assert_eq!(millis_to_time(time_to_millis(NEVER)), Some(NEVER));
        let t = at(10, 0, 0);
        assert_eq!(millis_to_time(time_to_millis(t)), Some(t));
    }
