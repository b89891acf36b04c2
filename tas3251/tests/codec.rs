//! End to end driver tests against the mock transport, asserting the
//! exact register sequences put on the wire.

use hex_literal::hex;
use tas3251::{
    device::{BiasLevel, ClockProvider, Config, DaiFormat, HwParams, SerialFormat, Supply, Tas3251},
    protocol::clocking::CONSUMER_RATES,
    transport::mock::MockTransport,
    Error,
};

fn provider_dac(mock: &MockTransport) -> Tas3251<MockTransport> {
    let dac = Tas3251::new(
        mock.clone(),
        Config {
            pll_in: Some(1),
            pll_out: Some(2),
        },
    )
    .unwrap();
    dac.set_fmt(DaiFormat {
        provider: ClockProvider::Provider,
        format: SerialFormat::I2s,
    })
    .unwrap();
    dac.set_sysclk(24_576_000);
    mock.take_journal();
    dac
}

#[test]
fn provider_hw_params_writes_the_full_clock_tree() {
    let mock = MockTransport::new();
    let dac = provider_dac(&mock);

    dac.hw_params(&HwParams {
        rate: 48_000,
        width: 32,
        channels: 2,
    })
    .unwrap();

    assert_eq!(
        mock.take_journal(),
        vec![
            // 32 bit slots
            (40, 0x03),
            // flex registers unlock the gpio clock output
            (0, 253),
            (63, 0x11),
            (64, 0xff),
            // clock error detection, ignoring missing-clock flags
            (0, 0),
            (37, 0x7a),
            // pll 24.576 MHz * 8 * 1 / 2 = 98.304 MHz
            (20, 1),
            (21, 1),
            (22, 0),
            (23, 0),
            (24, 7),
            // dac clocked straight off the pll input gpio
            (14, 0x50),
            (85, 0x05),
            // dividers, written minus one
            (27, 1),
            (28, 3),
            (29, 3),
            (30, 7),
            (32, 7),
            (33, 63),
            (34, 3),
            // pll reference and output gpio
            (13, 0x31),
            (18, 0x05),
            (4, 0x01),
            (8, 0x40),
            (85, 0x10),
        ]
    );

    let set = dac.committed_dividers().unwrap();
    assert_eq!(set.sample_rate, 48_000);
    assert_eq!(set.idac, 1024);
}

#[test]
fn consumer_hw_params_only_relaxes_clock_autoset() {
    let mock = MockTransport::new();
    let dac = Tas3251::new(mock.clone(), Config::default()).unwrap();
    mock.take_journal();

    dac.hw_params(&HwParams {
        rate: 44_100,
        width: 16,
        channels: 2,
    })
    .unwrap();

    // 16 bit slots, then nothing: the chip autosets its own dividers
    assert_eq!(mock.take_journal(), vec![(40, 0x00)]);
}

#[test]
fn provider_without_pll_clocks_the_dac_from_sclk() {
    let mock = MockTransport::new();
    let dac = Tas3251::new(mock.clone(), Config::default()).unwrap();
    dac.set_fmt(DaiFormat {
        provider: ClockProvider::Provider,
        format: SerialFormat::I2s,
    })
    .unwrap();
    dac.set_sysclk(24_576_000);
    mock.take_journal();

    dac.hw_params(&HwParams {
        rate: 48_000,
        width: 32,
        channels: 2,
    })
    .unwrap();

    assert_eq!(
        mock.take_journal(),
        vec![
            // 32 bit slots
            (40, 0x03),
            // clock error detection, with the pll lock flag also ignored
            (37, 0x7b),
            // dac fed straight from sclk, no flex unlock, no pll gpio
            (14, 0x40),
            // dividers, written minus one
            (27, 0),
            (28, 3),
            (29, 3),
            (30, 7),
            (32, 7),
            (33, 63),
            (34, 3),
        ]
    );

    let set = dac.committed_dividers().unwrap();
    assert!(set.pll.is_none());
    assert_eq!(set.sample_rate, 48_000);
}

#[test]
fn failed_write_aborts_hw_params_without_commit() {
    let mock = MockTransport::new();
    let dac = provider_dac(&mock);
    mock.set_fail_writes(true);

    let err = dac
        .hw_params(&HwParams {
            rate: 48_000,
            width: 32,
            channels: 2,
        })
        .unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    assert!(mock.take_journal().is_empty());
    assert!(dac.committed_dividers().is_none());
}

#[test]
fn bad_width_is_rejected_before_any_write() {
    let mock = MockTransport::new();
    let dac = provider_dac(&mock);

    let err = dac
        .hw_params(&HwParams {
            rate: 48_000,
            width: 17,
            channels: 2,
        })
        .unwrap_err();
    assert!(matches!(err, Error::BadWidth(17)));
    assert!(mock.take_journal().is_empty());
}

#[test]
fn consumer_startup_without_sclk_runs_the_pll_from_bclk() {
    let mock = MockTransport::new();
    let dac = Tas3251::new(mock.clone(), Config::default()).unwrap();
    mock.take_journal();

    dac.startup().unwrap();
    assert_eq!(mock.take_journal(), vec![(37, 0x08), (13, 0x11)]);

    match dac.rate_constraint(64).unwrap() {
        tas3251::device::RateConstraint::List(rates) => assert_eq!(rates, CONSUMER_RATES),
        other => panic!("unexpected constraint {:?}", other),
    }
}

#[test]
fn provider_rate_constraints_depend_on_frame_size() {
    let mock = MockTransport::new();
    let dac = provider_dac(&mock);

    match dac.rate_constraint(32).unwrap() {
        tas3251::device::RateConstraint::Any => {}
        other => panic!("unexpected constraint {:?}", other),
    }
    match dac.rate_constraint(64).unwrap() {
        tas3251::device::RateConstraint::Windows(w) => {
            assert_eq!(w, [(32_000, 195_312), (250_000, 96_000)]);
        }
        other => panic!("unexpected constraint {:?}", other),
    }
}

#[test]
fn mute_follows_analog_confirmation() {
    let mock = MockTransport::new();
    let dac = Tas3251::new(mock.clone(), Config::default()).unwrap();
    mock.take_journal();

    dac.mute_stream(true).unwrap();
    assert_eq!(mock.take_journal(), vec![(3, 0x11)]);

    dac.mute_stream(false).unwrap();
    assert_eq!(mock.take_journal(), vec![(3, 0x00)]);
}

#[test]
fn unconfirmed_unmute_times_out_quietly() {
    let mock = MockTransport::new();
    let dac = Tas3251::new(mock.clone(), Config::default()).unwrap();

    dac.mute_stream(true).unwrap();
    mock.take_journal();

    // amp stops confirming transitions; the driver still reports success
    mock.set_emulate_mute_det(false);
    dac.mute_stream(false).unwrap();
    assert_eq!(mock.take_journal(), vec![(3, 0x00)]);
}

#[test]
fn channel_switches_combine_with_stream_mute() {
    let mock = MockTransport::new();
    let dac = Tas3251::new(mock.clone(), Config::default()).unwrap();
    mock.take_journal();

    // mute left only
    assert!(dac.set_playback_switch(false, true).unwrap());
    assert_eq!(mock.take_journal(), vec![(3, 0x10)]);
    assert_eq!(dac.playback_switch(), (false, true));

    // no-op repeat
    assert!(!dac.set_playback_switch(false, true).unwrap());
    assert!(mock.take_journal().is_empty());

    // stream mute covers both channels, left switch stays off
    dac.mute_stream(true).unwrap();
    assert_eq!(mock.take_journal(), vec![(3, 0x11)]);
    dac.mute_stream(false).unwrap();
    assert_eq!(mock.take_journal(), vec![(3, 0x10)]);
}

#[test]
fn ppc3_stream_replays_once_per_rate() {
    let mock = MockTransport::new();
    let dac = Tas3251::new(mock.clone(), Config::default()).unwrap();
    mock.take_journal();

    let stream = hex!(
        "00 01"          // page 1
        "02 11"          // analog gain
        "fd 04 20 aa bb cc" // burst of 3 starting at 0x20
        "fe 01"          // 1 ms settle
        "f0 04 6e 6f 74 65" // text marker "note"
        "00 00"          // back to page 0
    );

    dac.load_config(&stream, 48_000).unwrap();
    assert_eq!(
        mock.take_journal(),
        vec![
            // dsp out of reset
            (2, 0x00),
            (0, 1),
            (2, 0x11),
            (0x20, 0xaa),
            (0x21, 0xbb),
            (0x22, 0xcc),
            (0, 0),
            // trailing page reset
            (0, 0),
        ]
    );
    assert_eq!(mock.reg(1, 2), 0x11);
    assert_eq!(dac.applied_rate(), Some(48_000));

    // same rate again is a no-op
    dac.load_config(&stream, 48_000).unwrap();
    assert!(mock.take_journal().is_empty());

    // a new rate replays the whole stream (dsp is already out of reset)
    dac.load_config(&stream, 96_000).unwrap();
    assert_eq!(mock.take_journal().len(), 7);
    assert_eq!(dac.applied_rate(), Some(96_000));
}

#[test]
fn truncated_ppc3_stream_is_rejected() {
    let mock = MockTransport::new();
    let dac = Tas3251::new(mock.clone(), Config::default()).unwrap();

    let err = dac.load_config(&hex!("03 11 28"), 48_000).unwrap_err();
    assert!(matches!(err, Error::Firmware(_)));
}

#[test]
fn suspend_resume_resyncs_modified_registers() {
    let mock = MockTransport::new();
    let dac = Tas3251::new(mock.clone(), Config::default()).unwrap();
    dac.probe(&mut ()).unwrap();
    dac.set_digital_volume(0x70, 0x70).unwrap();
    mock.take_journal();

    dac.suspend(&mut ()).unwrap();
    assert_eq!(mock.take_journal(), vec![(2, 0x91)]);

    dac.resume(&mut ()).unwrap();
    assert_eq!(
        mock.take_journal(),
        vec![
            // page select is replayed, the chip may have reset
            (0, 0),
            (2, 0x91),
            (61, 0x70),
            (62, 0x70),
            // power-down request lifted last
            (2, 0x10),
        ]
    );
}

#[test]
fn supply_event_forces_resync_when_leaving_off() {
    let mock = MockTransport::new();
    let dac = Tas3251::new(mock.clone(), Config::default()).unwrap();
    dac.probe(&mut ()).unwrap();
    mock.take_journal();

    dac.supply_event(Supply::Dvdd);
    // writes land in the cache only while the rail is down
    dac.set_digital_volume(0x70, 0x70).unwrap();
    assert!(mock.take_journal().is_empty());

    dac.set_bias_level(BiasLevel::Standby).unwrap();
    assert_eq!(
        mock.take_journal(),
        vec![
            // page tracking was invalidated by the supply event
            (0, 0),
            // power-down lifted, then the full non-default replay
            (2, 0x10),
            (2, 0x10),
            (61, 0x70),
            (62, 0x70),
            // standby request cleared last
            (2, 0x00),
        ]
    );
}

#[test]
fn bclk_ratio_overrides_the_frame_geometry() {
    let mock = MockTransport::new();
    let dac = provider_dac(&mock);
    dac.set_bclk_ratio(32).unwrap();

    dac.hw_params(&HwParams {
        rate: 44_100,
        width: 32,
        channels: 2,
    })
    .unwrap();

    let set = dac.committed_dividers().unwrap();
    assert_eq!(set.lrclk_div, 32);
    assert_eq!(set.bclk_div, 16);
    assert_eq!(set.sample_rate, 44_100);
}

#[test]
fn overclock_is_locked_while_a_stream_is_prepared() {
    let mock = MockTransport::new();
    let dac = Tas3251::new(mock.clone(), Config::default()).unwrap();

    dac.set_overclock_dsp(25).unwrap();
    assert_eq!(dac.overclock().dsp, 25);

    assert!(matches!(
        dac.set_overclock_pll(21),
        Err(Error::BadOverclock(21, 20))
    ));

    dac.set_bias_level(tas3251::device::BiasLevel::Standby)
        .unwrap();
    dac.set_bias_level(tas3251::device::BiasLevel::Prepare)
        .unwrap();
    assert!(matches!(dac.set_overclock_dac(10), Err(Error::Busy)));
}
