#![no_main]

//! Fuzz target for inter RPS prediction.
//!
//! A prediction derived by the encoder must rebuild the same set.

use arbitrary::Arbitrary;
use hevc_encoder::{InterRpsPrediction, ReferencePictureSet};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct PredictionInput {
    predictor: Vec<(i8, bool)>,
    current: Vec<(i8, bool)>,
    delta_rps: i8,
}

fuzz_target!(|input: PredictionInput| {
    let refs = |pairs: &[(i8, bool)]| {
        pairs
            .iter()
            .take(16)
            .map(|&(d, used)| (d as i32, used))
            .collect::<Vec<_>>()
    };

    let Ok(predictor) = ReferencePictureSet::new(0, refs(&input.predictor)) else {
        return;
    };
    let Ok(current) = ReferencePictureSet::new(0, refs(&input.current)) else {
        return;
    };

    let delta_rps = input.delta_rps as i32;
    if delta_rps == 0 {
        return;
    }

    if let Some(ref_idc) = current.prediction_from(&predictor, delta_rps) {
        let inter = InterRpsPrediction {
            delta_ridx_minus1: 0,
            delta_rps,
            ref_idc,
        };
        let rebuilt = ReferencePictureSet::apply_prediction(&predictor, &inter, 0)
            .expect("derived prediction must apply");
        assert!(rebuilt.same_pictures(&current));
    }
});
