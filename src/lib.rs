pub mod takeoutsort_core;
