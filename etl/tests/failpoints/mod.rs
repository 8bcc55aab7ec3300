mod merge_atomicity_test;
