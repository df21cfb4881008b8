use mirvcs::eval::{evaluate, evaluate_voc, iou_key, EvaluateConfig, ABSENT};
use mirvcs::model::{AnnotationSet, BBox, ConfusionMatrixType, ObjectAnnotation};
use proptest::prelude::*;

mod proptest_helpers;

fn config(iou_thrs: Vec<f64>) -> EvaluateConfig {
    EvaluateConfig {
        conf_thr: 0.0,
        iou_thrs,
        need_pr_curve: false,
        class_ids: Vec::new(),
    }
}

fn in_unit_or_absent(value: f64) -> bool {
    value == ABSENT || (0.0..=1.0).contains(&value)
}

const GT_BOX: BBox = BBox {
    xmin: 10.0,
    ymin: 10.0,
    xmax: 30.0,
    ymax: 30.0,
};
const FAR_BOX: BBox = BBox {
    xmin: 60.0,
    ymin: 60.0,
    xmax: 80.0,
    ymax: 80.0,
};

/// One ground-truth box per asset; each prediction either hits it exactly
/// or misses it entirely.
fn arb_unambiguous() -> impl Strategy<Value = (AnnotationSet, AnnotationSet)> {
    prop::collection::vec(prop::collection::vec((any::<bool>(), 0.01f64..=1.0), 0..=2), 1..=6)
        .prop_map(|assets| {
            let mut gt = AnnotationSet::default();
            let mut pred = AnnotationSet::default();
            for (i, preds) in assets.into_iter().enumerate() {
                let asset_id = proptest_helpers::asset_id(i);
                gt.image_annotations
                    .insert(asset_id.clone(), vec![ObjectAnnotation::new(0, 0, GT_BOX)]);
                let objects: Vec<ObjectAnnotation> = preds
                    .into_iter()
                    .enumerate()
                    .map(|(index, (hit, score))| {
                        let bbox = if hit { GT_BOX } else { FAR_BOX };
                        ObjectAnnotation::new(index as u32, 0, bbox).with_score(score)
                    })
                    .collect();
                if !objects.is_empty() {
                    pred.image_annotations.insert(asset_id, objects);
                }
            }
            (pred, gt)
        })
}

proptest! {
    #![proptest_config(proptest_helpers::proptest_config())]

    #[test]
    fn evaluation_scores_stay_in_bounds(
        pred in proptest_helpers::arb_annotation_set(5, 3, 4),
        gt in proptest_helpers::arb_annotation_set(5, 3, 4),
        thr in 0.1f64..=0.9,
    ) {
        prop_assume!(!gt.is_empty());
        let out = evaluate(&pred, &gt, &config(vec![thr, (thr + 0.05).min(1.0)])).expect("evaluate");
        let evaluation = &out.evaluation;

        for single in evaluation.iou_evaluations.values().chain([&evaluation.iou_averaged]) {
            prop_assert!(in_unit_or_absent(single.ci_averaged.ap));
            prop_assert!(in_unit_or_absent(single.ci_averaged.ar));
            for class in single.ci_evaluations.values() {
                prop_assert!(in_unit_or_absent(class.ap), "ap {}", class.ap);
                prop_assert!(in_unit_or_absent(class.ar), "ar {}", class.ar);
            }
        }
        prop_assert!(in_unit_or_absent(evaluation.map()));
    }

    #[test]
    fn confusion_tags_cover_every_object(
        pred in proptest_helpers::arb_annotation_set(5, 3, 4),
        gt in proptest_helpers::arb_annotation_set(5, 3, 4),
    ) {
        prop_assume!(!gt.is_empty());
        let out = evaluate(&pred, &gt, &config(vec![0.5])).expect("evaluate");
        let scored: std::collections::BTreeSet<_> = out.evaluation.config.class_ids.iter().copied().collect();

        for objects in out.prediction.image_annotations.values() {
            for object in objects.iter().filter(|o| scored.contains(&o.class_id)) {
                prop_assert!(matches!(
                    object.cm,
                    ConfusionMatrixType::Tp | ConfusionMatrixType::Fp | ConfusionMatrixType::Ignored
                ));
            }
        }
        for objects in out.ground_truth.image_annotations.values() {
            for object in objects {
                prop_assert!(matches!(
                    object.cm,
                    ConfusionMatrixType::Mtp | ConfusionMatrixType::Fn | ConfusionMatrixType::Ignored
                ));
            }
        }
        // Inputs are untouched.
        for objects in pred.image_annotations.values() {
            prop_assert!(objects.iter().all(|o| o.cm == ConfusionMatrixType::NotSet));
        }
    }

    #[test]
    fn voc_and_coco_agree_on_unambiguous_inputs((pred, gt) in arb_unambiguous()) {
        let cfg = config(vec![0.5]);
        let coco = evaluate(&pred, &gt, &cfg).expect("coco");
        let voc = evaluate_voc(&pred, &gt, &cfg).expect("voc");
        let coco_single = &coco.evaluation.iou_evaluations[&iou_key(0.5)];

        for (class_id, coco_class) in &coco_single.ci_evaluations {
            let voc_class = &voc.ci_evaluations[class_id];
            prop_assert!((coco_class.ap - voc_class.ap).abs() < 1e-9, "coco {} voc {}", coco_class.ap, voc_class.ap);
            prop_assert!((coco_class.ar - voc_class.ar).abs() < 1e-9);
            prop_assert_eq!(coco_class.tp, voc_class.tp);
            prop_assert_eq!(coco_class.fp, voc_class.fp);
            prop_assert_eq!(coco_class.fn_count, voc_class.fn_count);
        }
    }
}
