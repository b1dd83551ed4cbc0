// Composite scores stay within [0, 100] for any normalized inputs
use county_water_risk::config::calibration::IndexWeightTable;
use county_water_risk::counties::County;
use county_water_risk::features::DerivedFeatures;
use county_water_risk::model::{CountyMonthKey, YearMonth};
use county_water_risk::scoring::{score_index, IndexKind};
use proptest::prelude::*;

fn features(values: [f64; 6]) -> DerivedFeatures {
    let [water_stress, temperature_stress, soil_ph_risk, yield_gap, irrigation_gap, heat] = values;
    DerivedFeatures {
        key: CountyMonthKey::new(County::Makueni, YearMonth::new(2021, 2).unwrap()),
        evapotranspiration_mm: Ok(120.0),
        water_balance_mm: Ok(-40.0),
        water_stress: Ok(water_stress),
        temperature_stress: Ok(temperature_stress),
        soil_ph_risk: Ok(soil_ph_risk),
        irrigation_needed: Ok(true),
        irrigation_volume_l_ha: Ok(400_000.0),
        yield_t_ha: Ok(1.2),
        yield_gap: Ok(yield_gap),
        irrigation_gap: Ok(irrigation_gap),
        heat_stress_fraction: Ok(heat),
    }
}

proptest! {
    #[test]
    fn test_scores_stay_in_bounds(
        values in prop::array::uniform6(0.0f64..=1.0),
        adjustment in -1.0f64..=1.0,
    ) {
        let table = IndexWeightTable::default();
        let derived = features(values);
        for kind in IndexKind::ALL {
            let score = score_index(&derived, adjustment, kind.weights(&table)).unwrap();
            prop_assert!((0.0..=100.0).contains(&score.value), "{kind}: {}", score.value);
        }
    }

    #[test]
    fn test_scores_increase_with_water_stress(
        low in 0.0f64..0.5,
        delta in 0.01f64..0.5,
        adjustment in -0.2f64..=0.2,
    ) {
        let table = IndexWeightTable::default();
        let weights = IndexKind::WaterScarcity.weights(&table);
        let calm = score_index(&features([low, 0.2, 0.2, 0.2, 0.2, 0.0]), adjustment, weights).unwrap();
        let dry = score_index(&features([low + delta, 0.2, 0.2, 0.2, 0.2, 0.0]), adjustment, weights).unwrap();
        prop_assert!(dry.value >= calm.value);
    }
}
