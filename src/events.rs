//! Event logging. Infections, hospitalisations, recoveries and deaths are each written to their
//! own CSV report and counted in the daily counters, which are summarised and reset at the end of
//! every simulated day.
use std::path::Path;

use log::info;
use serde::Serialize;

use crate::context::Context;
use crate::create_report_trait;
use crate::define_data_plugin;
use crate::error::FacsError;
use crate::geometry::LatLon;
use crate::location::LocationType;
use crate::person::HealthStatus;
use crate::population::ContextPopulationExt;
use crate::report::ContextReportExt;

/// Counters shared by every agent update. The `_today` fields are reset by
/// `report_daily_summary`; the rest run for the whole simulation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DailyCounters {
    pub infections_today: usize,
    pub hospitalisations_today: usize,
    pub recoveries_today: usize,
    pub deaths_today: usize,
    /// People in hospital right now.
    pub num_hospitalised: usize,
    /// Minutes of visits planned so far.
    pub visit_minutes: f64,
    pub total_infections: usize,
    pub total_hospitalisations: usize,
    pub total_recoveries: usize,
    pub total_deaths: usize,
}

define_data_plugin!(CountersPlugin, DailyCounters, DailyCounters::default());

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct InfectionEvent {
    pub time: f64,
    pub x: f64,
    pub y: f64,
    pub location_type: LocationType,
    pub rank: usize,
    pub phase_duration: f64,
}
create_report_trait!(InfectionEvent);

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct HospitalisationEvent {
    pub time: f64,
    pub x: f64,
    pub y: f64,
    pub age: u8,
    pub rank: usize,
}
create_report_trait!(HospitalisationEvent);

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RecoveryEvent {
    pub time: f64,
    pub x: f64,
    pub y: f64,
    pub location_type: LocationType,
    pub rank: usize,
}
create_report_trait!(RecoveryEvent);

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DeathEvent {
    pub time: f64,
    pub x: f64,
    pub y: f64,
    pub location_type: LocationType,
    pub rank: usize,
}
create_report_trait!(DeathEvent);

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DailySummary {
    pub time: f64,
    pub susceptible: usize,
    pub exposed: usize,
    pub infectious: usize,
    pub recovered: usize,
    pub dead: usize,
    pub immune: usize,
    pub num_hospitalised: usize,
    pub infections: usize,
    pub hospitalisations: usize,
    pub recoveries: usize,
    pub deaths: usize,
    pub visit_minutes: f64,
}
create_report_trait!(DailySummary);

pub trait ContextEventsExt {
    /// Registers every event report under `output_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if a report file cannot be created.
    fn add_event_reports(&mut self, output_dir: &Path) -> Result<(), FacsError>;

    fn counters(&mut self) -> &DailyCounters;

    fn counters_mut(&mut self) -> &mut DailyCounters;

    /// Records an infection at `coords` and returns the number of infections today.
    ///
    /// # Errors
    ///
    /// Returns an error if the report row cannot be written.
    fn log_infection(
        &mut self,
        coords: LatLon,
        location_type: LocationType,
        phase_duration: f64,
    ) -> Result<usize, FacsError>;

    /// Records a hospital admission and returns the number of admissions today.
    ///
    /// # Errors
    ///
    /// Returns an error if the report row cannot be written.
    fn log_hospitalisation(&mut self, coords: LatLon, age: u8) -> Result<usize, FacsError>;

    /// Records a recovery and returns the number of recoveries today.
    ///
    /// # Errors
    ///
    /// Returns an error if the report row cannot be written.
    fn log_recovery(
        &mut self,
        coords: LatLon,
        location_type: LocationType,
    ) -> Result<usize, FacsError>;

    /// Records a death and returns the number of deaths today.
    ///
    /// # Errors
    ///
    /// Returns an error if the report row cannot be written.
    fn log_death(&mut self, coords: LatLon, location_type: LocationType)
        -> Result<usize, FacsError>;

    /// Writes the end-of-day summary and resets the daily counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the report row cannot be written.
    fn report_daily_summary(&mut self) -> Result<DailySummary, FacsError>;
}

impl ContextEventsExt for Context {
    fn add_event_reports(&mut self, output_dir: &Path) -> Result<(), FacsError> {
        self.add_report::<InfectionEvent>(&output_dir.join("infections.csv"))?;
        self.add_report::<HospitalisationEvent>(&output_dir.join("hospitalisations.csv"))?;
        self.add_report::<RecoveryEvent>(&output_dir.join("recoveries.csv"))?;
        self.add_report::<DeathEvent>(&output_dir.join("deaths.csv"))?;
        self.add_report::<DailySummary>(&output_dir.join("summary.csv"))?;
        Ok(())
    }

    fn counters(&mut self) -> &DailyCounters {
        self.get_data_container_mut(CountersPlugin)
    }

    fn counters_mut(&mut self) -> &mut DailyCounters {
        self.get_data_container_mut(CountersPlugin)
    }

    fn log_infection(
        &mut self,
        coords: LatLon,
        location_type: LocationType,
        phase_duration: f64,
    ) -> Result<usize, FacsError> {
        self.send_report(InfectionEvent {
            time: self.get_current_time(),
            x: coords.lon(),
            y: coords.lat(),
            location_type,
            rank: self.get_rank(),
            phase_duration,
        })?;
        let counters = self.counters_mut();
        counters.infections_today += 1;
        counters.total_infections += 1;
        Ok(counters.infections_today)
    }

    fn log_hospitalisation(&mut self, coords: LatLon, age: u8) -> Result<usize, FacsError> {
        self.send_report(HospitalisationEvent {
            time: self.get_current_time(),
            x: coords.lon(),
            y: coords.lat(),
            age,
            rank: self.get_rank(),
        })?;
        let counters = self.counters_mut();
        counters.hospitalisations_today += 1;
        counters.total_hospitalisations += 1;
        Ok(counters.hospitalisations_today)
    }

    fn log_recovery(
        &mut self,
        coords: LatLon,
        location_type: LocationType,
    ) -> Result<usize, FacsError> {
        self.send_report(RecoveryEvent {
            time: self.get_current_time(),
            x: coords.lon(),
            y: coords.lat(),
            location_type,
            rank: self.get_rank(),
        })?;
        let counters = self.counters_mut();
        counters.recoveries_today += 1;
        counters.total_recoveries += 1;
        Ok(counters.recoveries_today)
    }

    fn log_death(
        &mut self,
        coords: LatLon,
        location_type: LocationType,
    ) -> Result<usize, FacsError> {
        self.send_report(DeathEvent {
            time: self.get_current_time(),
            x: coords.lon(),
            y: coords.lat(),
            location_type,
            rank: self.get_rank(),
        })?;
        let counters = self.counters_mut();
        counters.deaths_today += 1;
        counters.total_deaths += 1;
        Ok(counters.deaths_today)
    }

    fn report_daily_summary(&mut self) -> Result<DailySummary, FacsError> {
        let time = self.get_current_time();
        let counters = self.counters().clone();
        let summary = DailySummary {
            time,
            susceptible: self.count_status(HealthStatus::Susceptible),
            exposed: self.count_status(HealthStatus::Exposed),
            infectious: self.count_status(HealthStatus::Infectious),
            recovered: self.count_status(HealthStatus::Recovered),
            dead: self.count_status(HealthStatus::Dead),
            immune: self.count_status(HealthStatus::Immune),
            num_hospitalised: counters.num_hospitalised,
            infections: counters.infections_today,
            hospitalisations: counters.hospitalisations_today,
            recoveries: counters.recoveries_today,
            deaths: counters.deaths_today,
            visit_minutes: counters.visit_minutes,
        };
        info!(
            "day {time}: {} infections, {} hospitalisations, {} recoveries, {} deaths, {} in hospital",
            summary.infections,
            summary.hospitalisations,
            summary.recoveries,
            summary.deaths,
            summary.num_hospitalised
        );
        self.send_report(summary.clone())?;

        let counters = self.counters_mut();
        counters.infections_today = 0;
        counters.hospitalisations_today = 0;
        counters.recoveries_today = 0;
        counters.deaths_today = 0;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn coords() -> LatLon {
        LatLon::new(52.0, 4.5).unwrap()
    }

    #[test]
    fn log_functions_return_running_counts() {
        let mut context = Context::new();
        assert_eq!(context.log_infection(coords(), LocationType::House, 4.0).unwrap(), 1);
        assert_eq!(context.log_infection(coords(), LocationType::Park, 2.0).unwrap(), 2);
        assert_eq!(context.log_hospitalisation(coords(), 70).unwrap(), 1);
        assert_eq!(context.log_recovery(coords(), LocationType::House).unwrap(), 1);
        assert_eq!(context.log_death(coords(), LocationType::Hospital).unwrap(), 1);

        let summary = context.report_daily_summary().unwrap();
        assert_eq!(summary.infections, 2);
        assert_eq!(summary.deaths, 1);

        let counters = context.counters();
        assert_eq!(counters.infections_today, 0);
        assert_eq!(counters.total_infections, 2);
        assert_eq!(counters.total_deaths, 1);
    }

    #[test]
    fn events_are_written_as_csv() {
        let mut context = Context::new();
        context.set_rank(3);
        let dir = tempdir().unwrap();
        context.add_event_reports(dir.path()).unwrap();

        context.log_infection(coords(), LocationType::School, 5.0).unwrap();
        context.log_recovery(coords(), LocationType::Hospital).unwrap();
        context.report_daily_summary().unwrap();

        let infections = fs::read_to_string(dir.path().join("infections.csv")).unwrap();
        let mut lines = infections.lines();
        assert_eq!(
            lines.next(),
            Some("time,x,y,location_type,rank,phase_duration")
        );
        assert_eq!(lines.next(), Some("0.0,4.5,52.0,school,3,5.0"));

        let recoveries = fs::read_to_string(dir.path().join("recoveries.csv")).unwrap();
        assert!(recoveries.ends_with("0.0,4.5,52.0,hospital,3\n"));

        let summary = fs::read_to_string(dir.path().join("summary.csv")).unwrap();
        assert_eq!(summary.lines().count(), 2);
        assert!(dir.path().join("deaths.csv").exists());
    }
}
