mod fakes;

mod worker_tests;
