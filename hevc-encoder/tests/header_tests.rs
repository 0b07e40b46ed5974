//! Integration tests for the SPS and slice header RPS syntax.

use hevc_encoder::gop::RefIdc;
use hevc_encoder::headers::rps_index_bits;
use hevc_encoder::{
    derive_schedule, write_st_ref_pic_set, CabacWriter, CavlcWriter, EncoderConfig,
    EntropyBackend, GopEntry, HeaderWriter, InterRpsPrediction, ReferencePictureSet, Schedule,
    SliceType,
};
use hevc_encoder_core::BitReader;
use pretty_assertions::assert_eq;

/// Parse `st_ref_pic_set(idx)` back into a set.
fn parse_st_ref_pic_set(
    reader: &mut BitReader,
    idx: usize,
    num_sets: usize,
    sets: &[ReferencePictureSet],
) -> ReferencePictureSet {
    let predicted = idx != 0 && reader.read_bit().unwrap();
    if predicted {
        let delta_idx_minus1 = if idx == num_sets {
            reader.read_ue().unwrap() as usize
        } else {
            0
        };
        let negative = reader.read_bit().unwrap();
        let magnitude = reader.read_ue().unwrap() as i32 + 1;
        let delta_rps = if negative { -magnitude } else { magnitude };

        let predictor = &sets[idx - delta_idx_minus1 - 1];
        let ref_idc = (0..=predictor.num_pictures())
            .map(|_| {
                if reader.read_bit().unwrap() {
                    RefIdc::UsedByCurrent
                } else if reader.read_bit().unwrap() {
                    RefIdc::KeptForPrediction
                } else {
                    RefIdc::Unused
                }
            })
            .collect();
        let inter = InterRpsPrediction {
            delta_ridx_minus1: delta_idx_minus1,
            delta_rps,
            ref_idc,
        };
        ReferencePictureSet::apply_prediction(predictor, &inter, 0).unwrap()
    } else {
        let num_negative = reader.read_ue().unwrap();
        let num_positive = reader.read_ue().unwrap();
        let mut refs = Vec::new();
        let mut previous = 0;
        for _ in 0..num_negative {
            previous -= reader.read_ue().unwrap() as i32 + 1;
            refs.push((previous, reader.read_bit().unwrap()));
        }
        previous = 0;
        for _ in 0..num_positive {
            previous += reader.read_ue().unwrap() as i32 + 1;
            refs.push((previous, reader.read_bit().unwrap()));
        }
        ReferencePictureSet::new(0, refs).unwrap()
    }
}

fn low_delay_config() -> EncoderConfig {
    EncoderConfig::new(vec![
        "P 1 3 0.4624 0 4 1 4 -1 -5 -9 -13".parse().unwrap(),
        "P 2 2 0.4624 0 4 1 4 -1 -2 -6 -10".parse().unwrap(),
        "P 3 3 0.4624 0 4 1 4 -1 -3 -7 -11".parse().unwrap(),
        "P 4 1 0.578 0 4 1 4 -1 -4 -8 -12".parse().unwrap(),
    ])
    .with_frames(64)
}

#[test]
fn test_sps_table_parses_back() {
    let config = low_delay_config();
    config.validate().unwrap();
    let schedule = Schedule::from_config(&config).unwrap();
    let headers = HeaderWriter::new(&config, &schedule);

    let mut backend = CavlcWriter::new();
    headers.write_sps_reference_structure(&mut backend).unwrap();
    backend.finish().unwrap();
    let data = backend.into_data();

    let mut r = BitReader::new(&data);
    assert_eq!(r.read_ue().unwrap(), config.log2_max_poc_lsb - 4);
    assert!(!r.read_bit().unwrap());
    assert_eq!(r.read_ue().unwrap(), 4); // max_dec_pic_buffering_minus1
    assert_eq!(r.read_ue().unwrap(), 0); // num_reorder_pics
    assert_eq!(r.read_ue().unwrap(), 0); // max_latency_increase_plus1
    assert_eq!(r.read_ue().unwrap(), 0); // log2_min_luma_coding_block_size_minus3
    assert_eq!(r.read_ue().unwrap(), 3);
    assert_eq!(r.read_ue().unwrap(), 0);
    assert_eq!(r.read_ue().unwrap(), 3);
    assert_eq!(r.read_ue().unwrap(), 2);
    assert_eq!(r.read_ue().unwrap(), 2);
    assert!(!r.read_bit().unwrap());

    let num_sets = r.read_ue().unwrap() as usize;
    assert_eq!(num_sets, schedule.sets().len());
    let mut parsed = Vec::new();
    for idx in 0..num_sets {
        let set = parse_st_ref_pic_set(&mut r, idx, num_sets, &parsed);
        assert!(
            set.same_pictures(&schedule.sets()[idx]),
            "set {} parsed as {:?}",
            idx,
            set.deltas
        );
        parsed.push(set);
    }
    assert!(!r.read_bit().unwrap()); // long_term_ref_pics_present_flag
}

#[test]
fn test_slice_rps_points_into_sps() {
    let config = low_delay_config();
    let schedule = Schedule::from_config(&config).unwrap();
    let headers = HeaderWriter::new(&config, &schedule);
    let bits = rps_index_bits(schedule.sets().len());

    for position in 1..40 {
        let picture = schedule.schedule_for(position).unwrap();
        let mut backend = CavlcWriter::new();
        headers.write_slice_rps(&mut backend, position).unwrap();
        let data = backend.into_data();

        let mut r = BitReader::new(&data);
        assert_eq!(r.read_bits(8).unwrap() as i32, picture.poc & 0xff);
        assert!(r.read_bit().unwrap());
        assert_eq!(r.read_bits(bits).unwrap() as usize, picture.rps_index);
    }
}

#[test]
fn test_slice_local_set() {
    let config = low_delay_config();
    let schedule = Schedule::from_config(&config).unwrap();
    let headers = HeaderWriter::new(&config, &schedule);

    let last = schedule.sets().len() - 1;
    let mut local = ReferencePictureSet::new(70, [(-1, true), (-2, false)]).unwrap();
    local.inter = Some(InterRpsPrediction {
        delta_ridx_minus1: 0,
        delta_rps: 0,
        ref_idc: Vec::new(),
    });
    // A prediction with deltaRPS 0 cannot be signalled.
    assert!(headers
        .write_slice_rps_explicit(&mut CavlcWriter::new(), 70, &local)
        .is_err());

    local.inter = None;
    let mut backend = CavlcWriter::new();
    headers
        .write_slice_rps_explicit(&mut backend, 70, &local)
        .unwrap();
    let data = backend.into_data();

    let mut r = BitReader::new(&data);
    assert_eq!(r.read_bits(8).unwrap(), 70);
    assert!(!r.read_bit().unwrap());
    let parsed = parse_st_ref_pic_set(&mut r, last + 1, last + 1, schedule.sets());
    assert!(parsed.same_pictures(&local));
}

#[test]
fn test_random_access_slice_headers() {
    let pattern = vec![
        GopEntry::new(SliceType::B, 4)
            .with_references(&[-4, -8])
            .with_qp(1, 0.4),
        GopEntry::new(SliceType::B, 2)
            .with_references(&[-2, 2])
            .with_qp(2, 0.3),
        GopEntry::new(SliceType::B, 1)
            .with_references(&[-1, 1, 3])
            .with_qp(3, 0.2)
            .non_reference(),
        GopEntry::new(SliceType::B, 3)
            .with_reference_usage(&[(-1, true), (1, true), (-3, false)])
            .with_qp(3, 0.2)
            .non_reference(),
    ];
    let config = EncoderConfig::new(pattern).with_frames(17);
    let schedule = derive_schedule(&config.gop, config.sequence_length()).unwrap();
    let headers = HeaderWriter::new(&config, &schedule);
    assert_eq!(headers.max_dec_pic_buffering_minus1(), 3);

    let mut backend = CavlcWriter::new();
    headers.write_slice_header(&mut backend, 3).unwrap();
    let data = backend.into_data();
    let mut r = BitReader::new(&data);
    assert!(r.read_bit().unwrap());
    assert_eq!(r.read_ue().unwrap(), 0);
    assert_eq!(r.read_ue().unwrap(), SliceType::B.raw());
    assert_eq!(r.read_bits(8).unwrap(), 1);
    assert!(r.read_bit().unwrap());
    assert_eq!(r.read_bits(3).unwrap(), 2);
    assert_eq!(r.read_se().unwrap(), 3);
}

#[test]
fn test_header_encoding_is_idempotent() {
    let config = low_delay_config();
    let schedule = Schedule::from_config(&config).unwrap();
    let headers = HeaderWriter::new(&config, &schedule);

    let encode_cavlc = || {
        let mut backend = CavlcWriter::new();
        headers.write_sps_reference_structure(&mut backend).unwrap();
        for position in 0..20 {
            headers.write_slice_header(&mut backend, position).unwrap();
        }
        backend.finish().unwrap();
        backend.into_data()
    };
    assert_eq!(encode_cavlc(), encode_cavlc());

    let encode_cabac = || {
        let mut backend = CabacWriter::new(SliceType::P, config.qp);
        for (idx, rps) in schedule.sets().iter().enumerate() {
            write_st_ref_pic_set(&mut backend, rps, idx, schedule.sets().len(), schedule.sets())
                .unwrap();
        }
        backend.finish().unwrap();
        backend.into_data()
    };
    let first = encode_cabac();
    assert!(!first.is_empty());
    assert_eq!(first, encode_cabac());
}

#[test]
fn test_headers_through_trait_object() {
    let config = low_delay_config();
    let schedule = Schedule::from_config(&config).unwrap();
    let headers = HeaderWriter::new(&config, &schedule);

    let mut cavlc = CavlcWriter::new();
    let backend: &mut dyn EntropyBackend = &mut cavlc;
    headers.write_slice_header(backend, 5).unwrap();
    assert!(cavlc.position() > 0);
}
